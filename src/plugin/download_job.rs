use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::core::backend::MediaBackend;
use crate::core::{filename, reveal};
use crate::models::media::{DownloadOutcome, DownloadProgress, DownloadRequest, DownloadState};
use crate::models::settings::PluginSettings;
use ytdlp_run_core::core::events::{
    ActivationHandler, NotificationData, Notifier, ProgressToast, Toast, PROGRESS_FIELD,
    PROGRESS_TAG,
};

/// What the user picked: everything a job needs besides the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSpec {
    pub title: String,
    pub url: String,
    pub selector: String,
    pub filename: Option<String>,
}

pub struct DownloadJob {
    pub title: String,
    pub request: DownloadRequest,
}

impl DownloadJob {
    /// Settings are read once here; later changes do not affect the job.
    pub fn new(spec: DownloadSpec, settings: &PluginSettings) -> Self {
        let output_template = filename::output_template(
            &settings.output_dir,
            spec.filename.as_deref(),
            &settings.filename_template,
        );

        Self {
            title: spec.title,
            request: DownloadRequest {
                ytdlp_path: settings.ytdlp_path.clone(),
                url: spec.url,
                selector: spec.selector,
                output_template,
            },
        }
    }

    pub async fn run(
        self,
        backend: Arc<dyn MediaBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> DownloadOutcome {
        tracing::info!(
            "Starting download '{}' ({}) format {} -> {}",
            self.title,
            self.request.url,
            self.request.selector,
            self.request.output_template.display()
        );

        let mut reporter = ProgressReporter::new(notifier.clone());
        reporter.show(&self.title);

        let (tx, mut rx) = mpsc::channel::<DownloadProgress>(32);
        let (log_tx, mut log_rx) = mpsc::channel::<String>(64);

        let progress_forwarder = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                if !reporter.apply(progress) {
                    break;
                }
            }
            reporter
        });

        let log_forwarder = tokio::spawn(async move {
            while let Some(line) = log_rx.recv().await {
                tracing::debug!("[yt-dlp] {}", line);
            }
        });

        let result = backend.download(&self.request, tx, log_tx).await;

        let reporter = progress_forwarder.await.ok();
        let _ = log_forwarder.await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => DownloadOutcome::Failed {
                error_output: vec![format!("{:#}", e)],
            },
        };

        match reporter {
            Some(reporter) => reporter.finish(&self.title, &outcome),
            None => ProgressReporter::new(notifier).finish(&self.title, &outcome),
        }

        outcome
    }
}

/// Drives one progress notification. Updates carry a strictly increasing
/// sequence number and a percentage that never goes down.
pub struct ProgressReporter {
    notifier: Arc<dyn Notifier>,
    sequence: u32,
    percent: f64,
    dismissed: bool,
}

impl ProgressReporter {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            sequence: 0,
            percent: 0.0,
            dismissed: false,
        }
    }

    pub fn show(&mut self, title: &str) {
        self.sequence = 1;
        self.notifier.show_progress(&ProgressToast {
            tag: PROGRESS_TAG.to_string(),
            heading: "Downloading Video".into(),
            title: title.to_string(),
            status: "Downloading...".into(),
            data: NotificationData::new(self.sequence)
                .with_value(PROGRESS_FIELD, format_percent(0.0)),
        });
    }

    /// Returns `false` once the surface is gone and no more updates matter.
    pub fn apply(&mut self, progress: DownloadProgress) -> bool {
        if self.dismissed {
            return false;
        }
        if progress.state == DownloadState::Success {
            self.dismiss();
            return false;
        }

        self.percent = self.percent.max(progress.percent.clamp(0.0, 100.0));
        self.sequence += 1;
        tracing::debug!("download progress {:.1}% (seq {})", self.percent, self.sequence);
        self.notifier.update_progress(
            PROGRESS_TAG,
            &NotificationData::new(self.sequence)
                .with_value(PROGRESS_FIELD, format_percent(self.percent)),
        );
        true
    }

    fn dismiss(&mut self) {
        if !self.dismissed {
            self.notifier.hide(PROGRESS_TAG);
            self.dismissed = true;
        }
    }

    pub fn finish(mut self, title: &str, outcome: &DownloadOutcome) {
        self.dismiss();

        match outcome {
            DownloadOutcome::Completed { file_path } => {
                tracing::info!("Download complete: {}", file_path.display());
                let path = file_path.to_string_lossy().to_string();
                self.notifier.on_activated(reveal_handler(file_path.clone()));
                self.notifier.show(
                    &Toast::new("Download complete")
                        .text("Click to open file location")
                        .argument("path", path),
                );
            }
            DownloadOutcome::Failed { error_output } => {
                let error = error_output.join("\n");
                tracing::error!("Download of '{}' failed: {}", title, error);
                self.notifier.show(
                    &Toast::new("Download failed")
                        .text(title)
                        .argument("error", error),
                );
            }
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }
}

fn reveal_handler(file_path: PathBuf) -> ActivationHandler {
    reveal_handler_with(file_path, reveal::reveal_file)
}

/// Activation handler that opens `file_path` with `reveal`, only for toasts
/// carrying that exact path.
fn reveal_handler_with<F>(file_path: PathBuf, reveal: F) -> ActivationHandler
where
    F: Fn(&Path) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let expected = file_path.to_string_lossy().to_string();
    Box::new(move |args| {
        if args.get("path") != Some(expected.as_str()) {
            return;
        }
        if let Err(e) = reveal(&file_path) {
            tracing::warn!("could not open file location {}: {:#}", file_path.display(), e);
        }
    })
}

/// Culture-independent percentage text, one decimal.
pub fn format_percent(percent: f64) -> String {
    format!("{:.1}", percent)
}

/// Fire-and-forget launcher handed to result actions.
#[derive(Clone)]
pub struct DownloadLauncher {
    runtime: Handle,
    backend: Arc<dyn MediaBackend>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<RwLock<PluginSettings>>,
    tracker: TaskTracker,
}

impl DownloadLauncher {
    pub fn new(
        runtime: Handle,
        backend: Arc<dyn MediaBackend>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<RwLock<PluginSettings>>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            runtime,
            backend,
            notifier,
            settings,
            tracker,
        }
    }

    pub fn start(&self, spec: DownloadSpec) {
        let settings = match self.settings.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let job = DownloadJob::new(spec, &settings);
        let backend = self.backend.clone();
        let notifier = self.notifier.clone();
        self.tracker
            .spawn_on(async move { job.run(backend, notifier).await }, &self.runtime);
    }
}
