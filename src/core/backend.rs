use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::ytdlp;
use crate::models::media::{
    DownloadOutcome, DownloadProgress, DownloadRequest, FetchRequest, VideoData,
};

/// The external downloader as seen by the plugin: list formats for a URL, and
/// stream one of them to disk.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Must honor `cancel`: once it fires the call returns an error promptly.
    async fn fetch_metadata(
        &self,
        req: &FetchRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<VideoData>;

    async fn download(
        &self,
        req: &DownloadRequest,
        progress: mpsc::Sender<DownloadProgress>,
        log: mpsc::Sender<String>,
    ) -> anyhow::Result<DownloadOutcome>;
}

pub struct YtdlpBackend;

impl YtdlpBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for YtdlpBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaBackend for YtdlpBackend {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch_metadata(
        &self,
        req: &FetchRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<VideoData> {
        let ytdlp_path = ytdlp::resolve_ytdlp(&req.ytdlp_path).await?;
        let json = ytdlp::get_video_info(&ytdlp_path, &req.url, &req.format_sort, cancel).await?;
        Ok(ytdlp::parse_video_data(&json, &req.url))
    }

    async fn download(
        &self,
        req: &DownloadRequest,
        progress: mpsc::Sender<DownloadProgress>,
        log: mpsc::Sender<String>,
    ) -> anyhow::Result<DownloadOutcome> {
        let ytdlp_path = ytdlp::resolve_ytdlp(&req.ytdlp_path).await?;
        ytdlp::download_video(
            &ytdlp_path,
            &req.url,
            &req.selector,
            &req.output_template,
            progress,
            log,
        )
        .await
    }
}
