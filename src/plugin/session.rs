use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::backend::MediaBackend;
use crate::core::url_parser::SearchInput;
use crate::models::media::{FetchRequest, VideoData, FORMAT_SORT};
use crate::models::settings::PluginSettings;

enum FetchState {
    Pending(JoinHandle<anyhow::Result<VideoData>>),
    /// Join handle taken by a delayed query that is blocking on it.
    Waiting,
    Ready(VideoData),
    Failed(String),
    Canceled,
}

pub struct FetchSession {
    generation: u64,
    url: String,
    filename: Option<String>,
    cancel: CancellationToken,
    state: FetchState,
}

impl FetchSession {
    fn view(&self) -> FetchView {
        match &self.state {
            FetchState::Pending(_) | FetchState::Waiting => FetchView::Pending {
                url: self.url.clone(),
                filename: self.filename.clone(),
            },
            FetchState::Ready(video) => FetchView::Ready {
                video: video.clone(),
                filename: self.filename.clone(),
            },
            FetchState::Failed(error) => FetchView::Failed {
                url: self.url.clone(),
                error: error.clone(),
            },
            FetchState::Canceled => FetchView::Canceled,
        }
    }
}

/// What the renderer sees of the authoritative session.
#[derive(Debug, Clone)]
pub enum FetchView {
    Pending {
        url: String,
        filename: Option<String>,
    },
    Ready {
        video: VideoData,
        filename: Option<String>,
    },
    Failed {
        url: String,
        error: String,
    },
    /// The session was superseded or its task died; nothing to render.
    Canceled,
    /// Another delayed query is already blocking on this fetch.
    Busy,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the single live [`FetchSession`]. Every outcome is stored only if the
/// session that launched it is still current.
pub struct QueryLifecycle {
    runtime: Handle,
    backend: Arc<dyn MediaBackend>,
    session: Mutex<Option<FetchSession>>,
    next_generation: AtomicU64,
    busy: AtomicBool,
}

impl QueryLifecycle {
    pub fn new(runtime: Handle, backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            runtime,
            backend,
            session: Mutex::new(None),
            next_generation: AtomicU64::new(0),
            busy: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<FetchSession>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// First pass. Never blocks and always leaves a pending fetch for
    /// `input.url`: a running fetch for the same URL is reused, a finished one
    /// (ready or failed) is started again.
    pub fn begin(&self, input: &SearchInput, settings: &PluginSettings) -> FetchView {
        let generation = self.ensure_session(input, settings, true);
        let guard = self.lock();
        match guard.as_ref().filter(|s| s.generation == generation) {
            Some(session) => session.view(),
            None => FetchView::Canceled,
        }
    }

    /// Second pass. Blocks the calling thread until the fetch for `input.url`
    /// settles. Only one caller may block at a time.
    pub fn wait(&self, input: &SearchInput, settings: &PluginSettings) -> FetchView {
        let generation = self.ensure_session(input, settings, false);

        if self.busy.swap(true, Ordering::SeqCst) {
            return FetchView::Busy;
        }
        let _busy = BusyGuard(&self.busy);

        let (handle, cancel, url) = {
            let mut guard = self.lock();
            let Some(session) = guard.as_mut().filter(|s| s.generation == generation) else {
                return FetchView::Canceled;
            };
            match std::mem::replace(&mut session.state, FetchState::Waiting) {
                FetchState::Pending(handle) => (handle, session.cancel.clone(), session.url.clone()),
                other => {
                    session.state = other;
                    return session.view();
                }
            }
        };

        let result = self.runtime.block_on(handle);
        let state = settle(result, &cancel, &url);

        let mut guard = self.lock();
        match guard.as_mut() {
            Some(session) if session.generation == generation => {
                session.state = state;
                session.view()
            }
            _ => {
                tracing::debug!("discarding fetch result for superseded {}", url);
                FetchView::Canceled
            }
        }
    }

    /// Drops the session, cancelling its fetch if it is still running.
    pub fn clear(&self) {
        if let Some(session) = self.lock().take() {
            session.cancel.cancel();
            tracing::debug!("cleared fetch session for {}", session.url);
        }
    }

    pub fn current_url(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.url.clone())
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.lock().as_ref().map(|s| s.generation)
    }

    fn ensure_session(
        &self,
        input: &SearchInput,
        settings: &PluginSettings,
        restart_finished: bool,
    ) -> u64 {
        let mut guard = self.lock();

        if let Some(session) = guard.as_mut() {
            let reusable = match session.state {
                FetchState::Pending(_) | FetchState::Waiting => true,
                FetchState::Ready(_) | FetchState::Failed(_) => !restart_finished,
                FetchState::Canceled => false,
            };
            if session.url == input.url && reusable {
                session.filename = input.filename.clone();
                return session.generation;
            }
            session.cancel.cancel();
            tracing::info!("superseding fetch for {}", session.url);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let req = FetchRequest {
            ytdlp_path: settings.ytdlp_path.clone(),
            url: input.url.clone(),
            format_sort: FORMAT_SORT.to_string(),
        };

        tracing::info!("fetching formats for {} via {}", req.url, self.backend.name());
        let backend = self.backend.clone();
        let task_cancel = cancel.clone();
        let handle = self
            .runtime
            .spawn(async move { backend.fetch_metadata(&req, task_cancel).await });

        *guard = Some(FetchSession {
            generation,
            url: input.url.clone(),
            filename: input.filename.clone(),
            cancel,
            state: FetchState::Pending(handle),
        });

        generation
    }
}

fn settle(
    result: Result<anyhow::Result<VideoData>, tokio::task::JoinError>,
    cancel: &CancellationToken,
    url: &str,
) -> FetchState {
    if cancel.is_cancelled() {
        return FetchState::Canceled;
    }
    match result {
        Ok(Ok(video)) => {
            tracing::info!("fetched {} formats for '{}'", video.formats.len(), video.title);
            FetchState::Ready(video)
        }
        Ok(Err(e)) => {
            tracing::warn!("fetch failed for {}: {:#}", url, e);
            FetchState::Failed(format!("{:#}", e))
        }
        Err(e) => {
            tracing::warn!("fetch task for {} did not finish: {}", url, e);
            FetchState::Canceled
        }
    }
}
