use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

pub const EXT_PLACEHOLDER: &str = "%(ext)s";

static CONTROL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\x00-\x1f\x7f]").unwrap());

/// Makes a user-typed name safe as a single path component while keeping it
/// literal otherwise: spacing is preserved, only forbidden path characters are
/// swapped for look-alikes and trailing spaces or dots are dropped. yt-dlp
/// `%(field)s` placeholders pass through untouched.
pub fn sanitize_filename(name: &str) -> String {
    let name: String = name.nfc().collect();
    let name = CONTROL_RE.replace_all(&name, "");
    let name = name.trim_end_matches([' ', '.']);

    let forbidden: &[(char, char)] = &[
        ('<', '＜'),
        ('>', '＞'),
        (':', '꞉'),
        ('"', '＂'),
        ('/', '⧸'),
        ('\\', '＼'),
        ('|', '｜'),
        ('?', '？'),
        ('*', '＊'),
    ];

    let mut result = name.to_string();
    for (from, to) in forbidden {
        result = result.replace(*from, &to.to_string());
    }

    result
}

/// `-o` value for a download. A missing or blank filename uses the configured
/// template exactly as stored.
pub fn output_template(output_dir: &Path, filename: Option<&str>, default_template: &str) -> PathBuf {
    match filename.map(sanitize_filename).filter(|n| !n.is_empty()) {
        Some(name) => output_dir.join(format!("{}.{}", name, EXT_PLACEHOLDER)),
        None => output_dir.join(default_template),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_forbidden_chars() {
        assert_eq!(sanitize_filename("a:b?c"), "a꞉b？c");
        assert_eq!(sanitize_filename("clip*final"), "clip＊final");
    }

    #[test]
    fn sanitize_keeps_spacing_literal() {
        assert_eq!(sanitize_filename("my   clip  v2"), "my   clip  v2");
        assert_eq!(sanitize_filename(" two  spaces"), " two  spaces");
        assert_eq!(sanitize_filename("clip "), "clip");
    }

    #[test]
    fn sanitize_drops_control_characters() {
        assert_eq!(sanitize_filename("my\tclip\n"), "myclip");
    }

    #[test]
    fn sanitize_trims_trailing_dots() {
        assert_eq!(sanitize_filename("holiday..."), "holiday");
    }

    #[test]
    fn sanitize_unicode_nfc_normalization() {
        assert_eq!(sanitize_filename("cafe\u{0301}"), "caf\u{00e9}");
    }

    #[test]
    fn sanitize_keeps_placeholders() {
        assert_eq!(sanitize_filename("%(title)s - %(id)s"), "%(title)s - %(id)s");
    }

    #[test]
    fn sanitize_blocks_path_traversal() {
        let result = sanitize_filename("../../etc/passwd");
        assert!(!result.contains('/'));
    }

    #[test]
    fn output_template_appends_ext_placeholder() {
        let dir = Path::new("downloads");
        assert_eq!(
            output_template(dir, Some("123 my-clip"), "%(title)s.%(ext)s"),
            dir.join("123 my-clip.%(ext)s")
        );
    }

    #[test]
    fn output_template_falls_back_to_default_unmodified() {
        let dir = Path::new("downloads");
        let template = "%(uploader)s/%(title)s [%(id)s].%(ext)s";
        assert_eq!(output_template(dir, None, template), dir.join(template));
        assert_eq!(output_template(dir, Some(""), template), dir.join(template));
        assert_eq!(output_template(dir, Some("   "), template), dir.join(template));
    }
}
