//! Desktop notification sink backed by `notify-rust`.
//!
//! On freedesktop systems the progress toast is a single notification whose
//! id is reused for every update and for the terminal toast that follows it.
//! Clicking the terminal toast runs the registered activation handlers.
//! Platforms without notification ids show the progress toast once.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use notify_rust::Notification;
use ytdlp_run_core::core::events::{
    ActivationHandler, NotificationData, Notifier, ProgressToast, Toast, PROGRESS_FIELD,
};

use crate::core::notify::Activations;

const APP_NAME: &str = "yt-dlp";
const DEFAULT_ACTION: &str = "default";

/// What a surface puts on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct DesktopToast {
    pub summary: String,
    pub body: String,
    pub progress: Option<i32>,
}

pub type ActionCallback = Box<dyn FnOnce() + Send>;

pub trait ToastSurface: Send + Sync + 'static {
    /// Shows `toast`, replacing notification `replaces` where the platform
    /// allows it. Returns the id of the shown notification if there is one.
    fn present(
        &self,
        toast: &DesktopToast,
        replaces: Option<u32>,
        on_action: Option<ActionCallback>,
    ) -> anyhow::Result<Option<u32>>;
}

pub struct NotifyRustSurface;

impl ToastSurface for NotifyRustSurface {
    fn present(
        &self,
        toast: &DesktopToast,
        replaces: Option<u32>,
        on_action: Option<ActionCallback>,
    ) -> anyhow::Result<Option<u32>> {
        let mut notification = Notification::new();
        notification
            .appname(APP_NAME)
            .summary(&toast.summary)
            .body(&toast.body);
        present_native(notification, toast, replaces, on_action)
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn present_native(
    mut notification: Notification,
    toast: &DesktopToast,
    replaces: Option<u32>,
    on_action: Option<ActionCallback>,
) -> anyhow::Result<Option<u32>> {
    use notify_rust::Hint;

    if let Some(id) = replaces {
        notification.id(id);
    }
    if let Some(percent) = toast.progress {
        notification.hint(Hint::CustomInt("value".to_string(), percent));
    }

    let Some(on_action) = on_action else {
        let handle = notification.show().context("show notification")?;
        return Ok(Some(handle.id()));
    };

    // The handle waits on the session bus, so it lives on its own thread.
    notification.action(DEFAULT_ACTION, "Open");
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::Builder::new()
        .name("toast-action".into())
        .spawn(move || match notification.show() {
            Ok(handle) => {
                let _ = tx.send(Ok(handle.id()));
                handle.wait_for_action(|action| {
                    if action == DEFAULT_ACTION {
                        on_action();
                    }
                });
            }
            Err(e) => {
                let _ = tx.send(Err(e));
            }
        })
        .context("spawn notification thread")?;

    let id = rx
        .recv()
        .context("notification thread exited")?
        .context("show notification")?;
    Ok(Some(id))
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn present_native(
    notification: Notification,
    _toast: &DesktopToast,
    _replaces: Option<u32>,
    _on_action: Option<ActionCallback>,
) -> anyhow::Result<Option<u32>> {
    let _shown = notification.show().context("show notification")?;
    Ok(None)
}

/// Whether a notification server answers. Only freedesktop sessions can be
/// asked; elsewhere the platform API is assumed present.
pub fn desktop_available() -> bool {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        notify_rust::get_server_information().is_ok()
    }
    #[cfg(not(all(unix, not(target_os = "macos"))))]
    {
        true
    }
}

struct ProgressEntry {
    toast: ProgressToast,
    shown_percent: i32,
    id: Option<u32>,
}

#[derive(Default)]
struct DesktopState {
    progress: HashMap<String, ProgressEntry>,
    /// Slot freed by `hide`, taken over by the next terminal toast.
    replace_next: Option<u32>,
}

pub struct DesktopNotifier<S: ToastSurface = NotifyRustSurface> {
    surface: S,
    state: Mutex<DesktopState>,
    activations: Activations,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::with_surface(NotifyRustSurface)
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ToastSurface> DesktopNotifier<S> {
    pub fn with_surface(surface: S) -> Self {
        Self {
            surface,
            state: Mutex::new(DesktopState::default()),
            activations: Activations::default(),
        }
    }

    pub fn activations(&self) -> Activations {
        self.activations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, DesktopState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn percent_of(data: &NotificationData) -> i32 {
    data.value(PROGRESS_FIELD)
        .and_then(|v| v.parse::<f64>().ok())
        .map(|p| p.clamp(0.0, 100.0) as i32)
        .unwrap_or(0)
}

fn progress_view(toast: &ProgressToast, percent: i32) -> DesktopToast {
    DesktopToast {
        summary: toast.heading.clone(),
        body: format!("{}\n{} {}%", toast.title, toast.status, percent),
        progress: Some(percent),
    }
}

impl<S: ToastSurface> Notifier for DesktopNotifier<S> {
    fn show_progress(&self, toast: &ProgressToast) {
        let mut state = self.lock();
        let current = state.progress.get(&toast.tag).and_then(|entry| entry.id);
        let replaces = current.or_else(|| state.replace_next.take());

        let percent = percent_of(&toast.data);
        let id = match self
            .surface
            .present(&progress_view(toast, percent), replaces, None)
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("[notify] progress toast failed: {:#}", e);
                None
            }
        };

        state.progress.insert(
            toast.tag.clone(),
            ProgressEntry {
                toast: toast.clone(),
                shown_percent: percent,
                id,
            },
        );
    }

    fn update_progress(&self, tag: &str, data: &NotificationData) {
        let mut state = self.lock();
        let Some(entry) = state.progress.get_mut(tag) else {
            return;
        };
        if data.sequence_number <= entry.toast.data.sequence_number {
            return;
        }
        entry.toast.data = data.clone();

        let percent = percent_of(data);
        if percent == entry.shown_percent {
            return;
        }
        let Some(id) = entry.id else {
            return;
        };

        match self
            .surface
            .present(&progress_view(&entry.toast, percent), Some(id), None)
        {
            Ok(new_id) => {
                entry.id = new_id.or(Some(id));
                entry.shown_percent = percent;
            }
            Err(e) => tracing::debug!("[notify] progress update failed: {:#}", e),
        }
    }

    fn hide(&self, tag: &str) {
        let mut state = self.lock();
        if let Some(entry) = state.progress.remove(tag) {
            state.replace_next = entry.id;
        }
    }

    fn show(&self, toast: &Toast) {
        self.activations.remember(&toast.arguments);

        let view = DesktopToast {
            summary: toast.heading().to_string(),
            body: toast.lines.iter().skip(1).cloned().collect::<Vec<_>>().join("\n"),
            progress: None,
        };
        let on_action = toast.arguments.iter().next().is_some().then(|| {
            let activations = self.activations.clone();
            let args = toast.arguments.clone();
            Box::new(move || activations.activate(&args)) as ActionCallback
        });

        let replaces = self.lock().replace_next.take();
        match self.surface.present(&view, replaces, on_action) {
            Ok(_) => tracing::info!("[notify] {}", view.summary),
            Err(e) => tracing::warn!("[notify] toast failed: {:#}", e),
        }
    }

    fn on_activated(&self, handler: ActivationHandler) {
        self.activations.register(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ytdlp_run_core::core::events::PROGRESS_TAG;

    #[derive(Default)]
    struct RecordingSurface {
        without_ids: bool,
        shown: Mutex<Vec<(DesktopToast, Option<u32>)>>,
        callbacks: Mutex<Vec<ActionCallback>>,
    }

    impl RecordingSurface {
        fn shown(&self) -> Vec<(DesktopToast, Option<u32>)> {
            self.shown.lock().unwrap().clone()
        }

        fn click_all(&self) {
            for callback in self.callbacks.lock().unwrap().drain(..) {
                callback();
            }
        }
    }

    impl ToastSurface for Arc<RecordingSurface> {
        fn present(
            &self,
            toast: &DesktopToast,
            replaces: Option<u32>,
            on_action: Option<ActionCallback>,
        ) -> anyhow::Result<Option<u32>> {
            let mut shown = self.shown.lock().unwrap();
            shown.push((toast.clone(), replaces));
            if let Some(callback) = on_action {
                self.callbacks.lock().unwrap().push(callback);
            }
            if self.without_ids {
                return Ok(None);
            }
            Ok(Some(replaces.unwrap_or(shown.len() as u32)))
        }
    }

    fn progress_toast() -> ProgressToast {
        ProgressToast {
            tag: PROGRESS_TAG.to_string(),
            heading: "Downloading Video".into(),
            title: "clip".into(),
            status: "Downloading...".into(),
            data: NotificationData::new(1).with_value(PROGRESS_FIELD, "0"),
        }
    }

    fn update(notifier: &impl Notifier, sequence: u32, percent: &str) {
        notifier.update_progress(
            PROGRESS_TAG,
            &NotificationData::new(sequence).with_value(PROGRESS_FIELD, percent),
        );
    }

    #[test]
    fn progress_updates_reuse_the_notification() {
        let surface = Arc::new(RecordingSurface::default());
        let notifier = DesktopNotifier::with_surface(surface.clone());

        notifier.show_progress(&progress_toast());
        update(&notifier, 2, "12.4");
        update(&notifier, 3, "12.9");
        update(&notifier, 2, "50");
        update(&notifier, 4, "100");

        let shown = surface.shown();
        assert_eq!(shown.len(), 3);
        assert_eq!(shown[0].1, None);
        assert_eq!(shown[0].0.progress, Some(0));
        assert_eq!(shown[1].1, Some(1));
        assert_eq!(shown[1].0.progress, Some(12));
        assert_eq!(shown[1].0.body, "clip\nDownloading... 12%");
        assert_eq!(shown[2].1, Some(1));
        assert_eq!(shown[2].0.progress, Some(100));
    }

    #[test]
    fn terminal_toast_replaces_progress_and_activates() {
        let surface = Arc::new(RecordingSurface::default());
        let notifier = DesktopNotifier::with_surface(surface.clone());
        let opened = Arc::new(Mutex::new(Vec::new()));
        let sink = opened.clone();
        notifier.on_activated(Box::new(move |args| {
            if let Some(path) = args.get("path") {
                sink.lock().unwrap().push(path.to_string());
            }
        }));

        notifier.show_progress(&progress_toast());
        notifier.hide(PROGRESS_TAG);
        notifier.show(
            &Toast::new("Download complete")
                .text("Click to open file location")
                .argument("path", "/tmp/clip.mp4"),
        );

        let shown = surface.shown();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[1].0.summary, "Download complete");
        assert_eq!(shown[1].0.body, "Click to open file location");
        assert_eq!(shown[1].0.progress, None);
        assert_eq!(shown[1].1, Some(1));
        assert!(opened.lock().unwrap().is_empty());

        surface.click_all();
        assert_eq!(*opened.lock().unwrap(), vec!["/tmp/clip.mp4".to_string()]);
        assert!(notifier.activations().activate_last());
        assert_eq!(opened.lock().unwrap().len(), 2);
    }

    #[test]
    fn toast_without_arguments_has_no_action() {
        let surface = Arc::new(RecordingSurface::default());
        let notifier = DesktopNotifier::with_surface(surface.clone());

        notifier.show(&Toast::new("Download failed").text("clip"));

        assert_eq!(surface.shown().len(), 1);
        assert!(surface.callbacks.lock().unwrap().is_empty());
    }

    #[test]
    fn surface_without_ids_shows_progress_once() {
        let surface = Arc::new(RecordingSurface {
            without_ids: true,
            ..Default::default()
        });
        let notifier = DesktopNotifier::with_surface(surface.clone());

        notifier.show_progress(&progress_toast());
        update(&notifier, 2, "40");
        notifier.hide(PROGRESS_TAG);
        notifier.show(&Toast::new("Download complete").argument("path", "/tmp/a.mp4"));

        let shown = surface.shown();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[1].1, None);
    }
}
