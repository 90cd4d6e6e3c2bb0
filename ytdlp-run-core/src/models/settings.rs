use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

pub const KEY_YTDLP_PATH: &str = "ytdlp_path";
pub const KEY_OUTPUT_DIR: &str = "output_dir";
pub const KEY_FILENAME_TEMPLATE: &str = "filename_template";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
}

fn default_schema_version() -> u32 {
    SETTINGS_SCHEMA_VERSION
}

pub fn default_ytdlp_path() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("yt-dlp.exe")
    } else {
        PathBuf::from("yt-dlp")
    }
}

pub fn default_output_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_filename_template() -> String {
    "%(title)s.%(ext)s".into()
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            ytdlp_path: default_ytdlp_path(),
            output_dir: default_output_dir(),
            filename_template: default_filename_template(),
        }
    }
}

impl PluginSettings {
    /// Applies a single host option by key. Returns `false` for unknown keys.
    pub fn apply_option(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim();
        match key {
            KEY_YTDLP_PATH => {
                self.ytdlp_path = if value.is_empty() {
                    default_ytdlp_path()
                } else {
                    PathBuf::from(value)
                };
            }
            KEY_OUTPUT_DIR => {
                self.output_dir = if value.is_empty() {
                    default_output_dir()
                } else {
                    PathBuf::from(value)
                };
            }
            KEY_FILENAME_TEMPLATE => {
                self.filename_template = if value.is_empty() {
                    default_filename_template()
                } else {
                    value.to_string()
                };
            }
            _ => return false,
        }
        true
    }

    pub fn option_value(&self, key: &str) -> Option<String> {
        match key {
            KEY_YTDLP_PATH => Some(self.ytdlp_path.to_string_lossy().to_string()),
            KEY_OUTPUT_DIR => Some(self.output_dir.to_string_lossy().to_string()),
            KEY_FILENAME_TEMPLATE => Some(self.filename_template.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: PluginSettings =
            serde_json::from_str(r#"{"output_dir": "/tmp/videos"}"#).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/videos"));
        assert_eq!(settings.filename_template, "%(title)s.%(ext)s");
        assert_eq!(settings.ytdlp_path, default_ytdlp_path());
        assert_eq!(settings.schema_version, SETTINGS_SCHEMA_VERSION);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let settings: PluginSettings =
            serde_json::from_str(r#"{"theme": "dark", "filename_template": "%(id)s.%(ext)s"}"#)
                .unwrap();
        assert_eq!(settings.filename_template, "%(id)s.%(ext)s");
    }

    #[test]
    fn apply_option_sets_known_keys() {
        let mut settings = PluginSettings::default();
        assert!(settings.apply_option(KEY_YTDLP_PATH, r"C:\tools\yt-dlp.exe"));
        assert_eq!(settings.ytdlp_path, PathBuf::from(r"C:\tools\yt-dlp.exe"));
        assert!(settings.apply_option(KEY_FILENAME_TEMPLATE, "%(id)s.%(ext)s"));
        assert_eq!(settings.filename_template, "%(id)s.%(ext)s");
    }

    #[test]
    fn apply_option_blank_value_restores_default() {
        let mut settings = PluginSettings::default();
        settings.filename_template = "custom.%(ext)s".into();
        assert!(settings.apply_option(KEY_FILENAME_TEMPLATE, "   "));
        assert_eq!(settings.filename_template, default_filename_template());
    }

    #[test]
    fn apply_option_rejects_unknown_key() {
        let mut settings = PluginSettings::default();
        let before = settings.clone();
        assert!(!settings.apply_option("proxy", "socks5://localhost"));
        assert_eq!(settings, before);
    }

    #[test]
    fn option_value_round_trips_template() {
        let settings = PluginSettings::default();
        assert_eq!(
            settings.option_value(KEY_FILENAME_TEMPLATE).as_deref(),
            Some("%(title)s.%(ext)s")
        );
        assert!(settings.option_value("nope").is_none());
    }
}
