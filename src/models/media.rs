use std::path::PathBuf;

pub const BEST_FORMAT_LABEL: &str = "Best Video+Audio";
pub const BEST_FORMAT_SELECTOR: &str = "bestvideo+bestaudio/best";
pub const FORMAT_SORT: &str = "quality,hasvid,hasaud,fps";

#[derive(Debug, Clone)]
pub struct VideoData {
    pub title: String,
    pub url: String,
    pub extractor: Option<String>,
    pub duration_seconds: Option<f64>,
    pub formats: Vec<FormatData>,
}

/// One entry of the downloader's `formats` array, in its native order.
#[derive(Debug, Clone)]
pub struct FormatData {
    pub format_id: String,
    pub format: String,
    pub ext: String,
    pub resolution: Option<String>,
    pub fps: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
    pub filesize: Option<u64>,
}

impl FormatData {
    /// Short description for tooltips, e.g. `mp4 · 1920x1080 · 25 fps · video only · 76.3 MiB`.
    pub fn details(&self) -> String {
        let mut parts = Vec::new();
        if !self.ext.is_empty() {
            parts.push(self.ext.clone());
        }
        if let Some(resolution) = &self.resolution {
            parts.push(resolution.clone());
        }
        if let Some(fps) = self.fps.filter(|f| *f > 0.0) {
            parts.push(format!("{} fps", fps.round()));
        }
        match (self.has_video, self.has_audio) {
            (true, false) => parts.push("video only".to_string()),
            (false, true) => parts.push("audio only".to_string()),
            _ => {}
        }
        if let Some(size) = self.filesize {
            parts.push(format_size(size));
        }
        parts.join(" · ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOption {
    pub label: String,
    pub selector: String,
    pub url: String,
    pub details: String,
}

impl FormatOption {
    pub fn best(url: &str) -> Self {
        Self {
            label: BEST_FORMAT_LABEL.to_string(),
            selector: BEST_FORMAT_SELECTOR.to_string(),
            url: url.to_string(),
            details: String::new(),
        }
    }

    pub fn from_format(format: &FormatData, url: &str) -> Self {
        Self {
            label: format.format.clone(),
            selector: format.format_id.clone(),
            url: url.to_string(),
            details: format.details(),
        }
    }
}

impl VideoData {
    /// Synthesized best option first, then the discovered formats with the
    /// downloader's last-listed format directly below it.
    pub fn ranked_options(&self) -> Vec<FormatOption> {
        let mut options = Vec::with_capacity(self.formats.len() + 1);
        options.push(FormatOption {
            details: self.details(),
            ..FormatOption::best(&self.url)
        });
        options.extend(
            self.formats
                .iter()
                .rev()
                .map(|f| FormatOption::from_format(f, &self.url)),
        );
        options
    }

    /// Site and duration, e.g. `Youtube · 3:32`.
    pub fn details(&self) -> String {
        let mut parts = Vec::new();
        if let Some(extractor) = &self.extractor {
            parts.push(extractor.clone());
        }
        if let Some(seconds) = self.duration_seconds.filter(|d| *d > 0.0) {
            parts.push(format_duration(seconds));
        }
        parts.join(" · ")
    }
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    let mib = bytes as f64 / MIB;
    if mib >= 1024.0 {
        format!("{:.1} GiB", mib / 1024.0)
    } else {
        format!("{:.1} MiB", mib)
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub ytdlp_path: PathBuf,
    pub url: String,
    pub format_sort: String,
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub ytdlp_path: PathBuf,
    pub url: String,
    pub selector: String,
    pub output_template: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Downloading,
    PostProcessing,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub state: DownloadState,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Completed { file_path: PathBuf },
    Failed { error_output: Vec<String> },
}
