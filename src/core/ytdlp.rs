use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{anyhow, Context};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::process;
use crate::models::media::{
    DownloadOutcome, DownloadProgress, DownloadState, FormatData, VideoData,
};

const PROGRESS_PREFIX: &str = "ytdlp-run-progress:";
const POSTPROCESS_PREFIX: &str = "ytdlp-run-postprocess:";
const SAVED_PREFIX: &str = "ytdlp-run-saved:";

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());

fn bin_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

fn is_explicit_path(path: &Path) -> bool {
    path.is_absolute() || path.components().count() > 1
}

/// Resolves the configured executable. Bare names are probed through `PATH`
/// and then the managed bin directory; explicit paths must exist.
pub async fn find_ytdlp(configured: &Path) -> Option<PathBuf> {
    if is_explicit_path(configured) {
        return match tokio::fs::metadata(configured).await {
            Ok(meta) if meta.is_file() => Some(configured.to_path_buf()),
            _ => None,
        };
    }

    if let Ok(status) = process::command(configured)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        if status.success() {
            return Some(configured.to_path_buf());
        }
    }

    let managed = process::managed_bin_dir()?.join(bin_name());
    if managed.exists() {
        return Some(managed);
    }

    None
}

pub async fn resolve_ytdlp(configured: &Path) -> anyhow::Result<PathBuf> {
    find_ytdlp(configured).await.ok_or_else(|| {
        anyhow!(
            "yt-dlp not found at '{}', set the downloader path in the plugin settings",
            configured.display()
        )
    })
}

pub fn fetch_args(url: &str, format_sort: &str) -> Vec<String> {
    vec![
        "--dump-single-json".to_string(),
        "--no-warnings".to_string(),
        "--no-playlist".to_string(),
        "-S".to_string(),
        format_sort.to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

/// Runs a metadata-only fetch. Cancelling the token kills the child and
/// returns an error.
pub async fn get_video_info(
    ytdlp: &Path,
    url: &str,
    format_sort: &str,
    cancel: CancellationToken,
) -> anyhow::Result<serde_json::Value> {
    let mut cmd = process::command(ytdlp);
    cmd.args(fetch_args(url, format_sort))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = tokio::select! {
        _ = cancel.cancelled() => {
            return Err(anyhow!("metadata fetch for {} was canceled", url));
        }
        res = cmd.output() => res.context("failed to run yt-dlp")?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("yt-dlp failed: {}", stderr.trim()));
    }

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).context("yt-dlp returned invalid JSON")?;

    Ok(json)
}

pub fn parse_video_data(json: &serde_json::Value, requested_url: &str) -> VideoData {
    let title = json
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let url = json
        .get("webpage_url")
        .or_else(|| json.get("original_url"))
        .and_then(|v| v.as_str())
        .unwrap_or(requested_url)
        .to_string();

    VideoData {
        title,
        url,
        extractor: json
            .get("extractor_key")
            .or_else(|| json.get("extractor"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        duration_seconds: json.get("duration").and_then(|v| v.as_f64()),
        formats: parse_formats(json),
    }
}

pub fn parse_formats(json: &serde_json::Value) -> Vec<FormatData> {
    let formats = match json.get("formats").and_then(|v| v.as_array()) {
        Some(f) => f,
        None => return Vec::new(),
    };

    let mut result = Vec::new();
    for f in formats {
        let format_id = match f.get("format_id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => continue,
        };

        let ext = f.get("ext").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let width = f.get("width").and_then(|v| v.as_u64()).map(|v| v as u32);
        let height = f.get("height").and_then(|v| v.as_u64()).map(|v| v as u32);
        let vcodec = f.get("vcodec").and_then(|v| v.as_str());
        let acodec = f.get("acodec").and_then(|v| v.as_str());

        let resolution = match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(format!("{}x{}", w, h)),
            _ => f.get("resolution").and_then(|v| v.as_str()).map(|s| s.to_string()),
        };

        let format = f
            .get("format")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| match &resolution {
                Some(res) => format!("{} - {}", format_id, res),
                None => format_id.clone(),
            });

        result.push(FormatData {
            format,
            ext,
            resolution,
            fps: f.get("fps").and_then(|v| v.as_f64()),
            has_video: vcodec.map(|v| v != "none").unwrap_or(false),
            has_audio: acodec.map(|v| v != "none").unwrap_or(false),
            filesize: f
                .get("filesize")
                .or_else(|| f.get("filesize_approx"))
                .and_then(|v| v.as_u64()),
            format_id,
        });
    }

    result
}

pub fn download_args(url: &str, selector: &str, output_template: &Path) -> Vec<String> {
    vec![
        "-f".to_string(),
        selector.to_string(),
        "--no-playlist".to_string(),
        "--newline".to_string(),
        "--no-colors".to_string(),
        "--progress".to_string(),
        "--progress-template".to_string(),
        format!("download:{}%(progress._percent_str)s", PROGRESS_PREFIX),
        "--progress-template".to_string(),
        format!("postprocess:{}%(progress.postprocessor)s", POSTPROCESS_PREFIX),
        "--print".to_string(),
        format!("after_move:{}%(filepath)s", SAVED_PREFIX),
        "-o".to_string(),
        output_template.to_string_lossy().to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq)]
enum OutputLine {
    Progress(DownloadProgress),
    Saved(PathBuf),
    Other(String),
}

fn classify_line(raw: &str) -> OutputLine {
    let line = ANSI_RE.replace_all(raw, "");
    let line = line.trim();

    if let Some(path) = line.strip_prefix(SAVED_PREFIX) {
        return OutputLine::Saved(PathBuf::from(path.trim()));
    }

    if line.starts_with(POSTPROCESS_PREFIX) {
        return OutputLine::Progress(DownloadProgress {
            state: DownloadState::PostProcessing,
            percent: 100.0,
        });
    }

    match parse_progress_line(line) {
        Some(percent) => OutputLine::Progress(DownloadProgress {
            state: DownloadState::Downloading,
            percent,
        }),
        None => OutputLine::Other(line.to_string()),
    }
}

fn parse_progress_line(line: &str) -> Option<f64> {
    let pct_str = line.strip_prefix(PROGRESS_PREFIX)?;
    let pct = pct_str.trim().trim_end_matches('%').trim().parse::<f64>().ok()?;
    Some(pct.clamp(0.0, 100.0))
}

/// Streams a download. Progress lines may arrive on either stream; every other
/// stderr line is forwarded to `log` and kept as the failure text.
pub async fn download_video(
    ytdlp: &Path,
    url: &str,
    selector: &str,
    output_template: &Path,
    progress: mpsc::Sender<DownloadProgress>,
    log: mpsc::Sender<String>,
) -> anyhow::Result<DownloadOutcome> {
    if let Some(dir) = output_template.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
    }

    let mut child = process::command(ytdlp)
        .args(download_args(url, selector, output_template))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to start yt-dlp")?;

    let stdout = child.stdout.take().ok_or_else(|| anyhow!("yt-dlp stdout unavailable"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow!("yt-dlp stderr unavailable"))?;

    let progress_out = progress.clone();
    let stdout_reader = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let mut saved = None;
        while let Ok(Some(line)) = lines.next_line().await {
            match classify_line(&line) {
                OutputLine::Progress(p) => {
                    let _ = progress_out.send(p).await;
                }
                OutputLine::Saved(path) => saved = Some(path),
                OutputLine::Other(text) if !text.is_empty() => {
                    tracing::debug!("[yt-dlp] {}", text);
                }
                OutputLine::Other(_) => {}
            }
        }
        saved
    });

    let progress_err = progress.clone();
    let stderr_reader = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut error_lines = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            match classify_line(&line) {
                OutputLine::Progress(p) => {
                    let _ = progress_err.send(p).await;
                }
                OutputLine::Other(text) if !text.is_empty() => {
                    let _ = log.send(text.clone()).await;
                    error_lines.push(text);
                }
                _ => {}
            }
        }
        error_lines
    });

    let status = child.wait().await.context("yt-dlp process failed")?;

    let saved = stdout_reader.await.unwrap_or_default();
    let mut error_output = stderr_reader.await.unwrap_or_default();

    if !status.success() {
        if error_output.is_empty() {
            error_output.push(format!("yt-dlp exited with {}", status));
        }
        return Ok(DownloadOutcome::Failed { error_output });
    }

    let _ = progress
        .send(DownloadProgress {
            state: DownloadState::Success,
            percent: 100.0,
        })
        .await;

    match saved {
        Some(file_path) => Ok(DownloadOutcome::Completed { file_path }),
        None => Ok(DownloadOutcome::Failed {
            error_output: vec!["yt-dlp finished without reporting the output file".to_string()],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "extractor_key": "Youtube",
            "duration": 212.0,
            "formats": [
                {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none",
                 "resolution": "storyboard", "format": "sb0 - 48x27 (storyboard)"},
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2",
                 "filesize": 3_433_000u64, "format": "140 - audio only (medium)"},
                {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none",
                 "width": 1920, "height": 1080, "fps": 25.0, "filesize_approx": 80_000_000u64},
                {"ext": "mp4"}
            ]
        })
    }

    #[test]
    fn parse_video_data_reads_title_and_canonical_url() {
        let data = parse_video_data(&sample_json(), "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(data.title, "Never Gonna Give You Up");
        assert_eq!(data.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(data.extractor.as_deref(), Some("Youtube"));
    }

    #[test]
    fn parse_video_data_falls_back_to_requested_url() {
        let data = parse_video_data(&serde_json::json!({}), "https://example.com/v");
        assert_eq!(data.url, "https://example.com/v");
        assert_eq!(data.title, "unknown");
        assert!(data.formats.is_empty());
    }

    #[test]
    fn parse_formats_keeps_native_order_and_skips_missing_ids() {
        let formats = parse_formats(&sample_json());
        let ids: Vec<&str> = formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, vec!["sb0", "140", "137"]);
    }

    #[test]
    fn parse_formats_derives_label_and_streams() {
        let formats = parse_formats(&sample_json());
        let video = &formats[2];
        assert_eq!(video.format, "137 - 1920x1080");
        assert_eq!(video.resolution.as_deref(), Some("1920x1080"));
        assert!(video.has_video);
        assert!(!video.has_audio);
        assert_eq!(video.filesize, Some(80_000_000));

        let audio = &formats[1];
        assert_eq!(audio.format, "140 - audio only (medium)");
        assert!(!audio.has_video);
        assert!(audio.has_audio);
    }

    #[test]
    fn fetch_args_pass_sort_and_separate_url() {
        let args = fetch_args("https://example.com/v", "quality,hasvid,hasaud,fps");
        let sort_pos = args.iter().position(|a| a == "-S").unwrap();
        assert_eq!(args[sort_pos + 1], "quality,hasvid,hasaud,fps");
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args.last().unwrap(), "https://example.com/v");
    }

    #[test]
    fn download_args_use_selector_and_template() {
        let template = Path::new("/downloads").join("clip.%(ext)s");
        let args = download_args("https://example.com/v", "22", &template);
        assert_eq!(args[0], "-f");
        assert_eq!(args[1], "22");
        let o = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o + 1], template.to_string_lossy());
        assert!(args.iter().any(|a| a.starts_with("after_move:")));
    }

    #[test]
    fn progress_line_is_parsed() {
        assert_eq!(
            classify_line("ytdlp-run-progress:  45.3%"),
            OutputLine::Progress(DownloadProgress {
                state: DownloadState::Downloading,
                percent: 45.3
            })
        );
    }

    #[test]
    fn progress_line_with_color_codes() {
        assert_eq!(
            classify_line("ytdlp-run-progress:\x1b[0;94m 12.0%\x1b[0m"),
            OutputLine::Progress(DownloadProgress {
                state: DownloadState::Downloading,
                percent: 12.0
            })
        );
    }

    #[test]
    fn unknown_percent_is_not_progress() {
        assert_eq!(
            classify_line("ytdlp-run-progress:Unknown %"),
            OutputLine::Other("ytdlp-run-progress:Unknown %".to_string())
        );
    }

    #[test]
    fn postprocess_line_marks_postprocessing() {
        match classify_line("ytdlp-run-postprocess:Merger") {
            OutputLine::Progress(p) => assert_eq!(p.state, DownloadState::PostProcessing),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn saved_line_yields_path() {
        assert_eq!(
            classify_line("ytdlp-run-saved:/home/me/Downloads/clip.mp4"),
            OutputLine::Saved(PathBuf::from("/home/me/Downloads/clip.mp4"))
        );
    }

    #[test]
    fn error_line_is_other() {
        assert_eq!(
            classify_line("ERROR: [youtube] abc: Video unavailable"),
            OutputLine::Other("ERROR: [youtube] abc: Video unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn explicit_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(bin_name());
        assert!(find_ytdlp(&missing).await.is_none());
        assert!(resolve_ytdlp(&missing).await.is_err());
    }

    #[tokio::test]
    async fn explicit_existing_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join(bin_name());
        std::fs::write(&exe, b"").unwrap();
        assert_eq!(find_ytdlp(&exe).await, Some(exe));
    }
}
