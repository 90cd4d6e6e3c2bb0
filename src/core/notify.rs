use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ytdlp_run_core::core::events::{
    ActivationHandler, NotificationData, Notifier, ProgressToast, Toast, ToastArguments,
    PROGRESS_FIELD,
};

#[derive(Default)]
struct ActivationState {
    handlers: Vec<ActivationHandler>,
    last: Option<ToastArguments>,
}

/// Registered activation handlers plus the arguments of the most recent
/// terminal toast. Clones share the same state.
#[derive(Clone, Default)]
pub struct Activations {
    inner: Arc<Mutex<ActivationState>>,
}

impl Activations {
    fn lock(&self) -> MutexGuard<'_, ActivationState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, handler: ActivationHandler) {
        self.lock().handlers.push(handler);
    }

    pub fn remember(&self, args: &ToastArguments) {
        self.lock().last = Some(args.clone());
    }

    /// Runs every handler against `args`.
    pub fn activate(&self, args: &ToastArguments) {
        for handler in &self.lock().handlers {
            handler(args);
        }
    }

    /// Replays the last toast's activation. Returns `false` when no toast was
    /// shown yet.
    pub fn activate_last(&self) -> bool {
        let state = self.lock();
        let Some(args) = state.last.as_ref() else {
            return false;
        };
        for handler in &state.handlers {
            handler(args);
        }
        true
    }
}

/// Notification sink for terminal hosts: progress and toasts go to stderr and
/// the most recent toast can be activated on demand.
#[derive(Default)]
pub struct ConsoleNotifier {
    progress: Mutex<HashMap<String, ProgressToast>>,
    activations: Activations,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activations(&self) -> Activations {
        self.activations.clone()
    }
}

impl Notifier for ConsoleNotifier {
    fn show_progress(&self, toast: &ProgressToast) {
        let Ok(mut progress) = self.progress.lock() else {
            return;
        };
        eprintln!(
            "{}: {} {}%",
            toast.heading,
            toast.title,
            toast.data.value(PROGRESS_FIELD).unwrap_or("0")
        );
        progress.insert(toast.tag.clone(), toast.clone());
    }

    fn update_progress(&self, tag: &str, data: &NotificationData) {
        let Ok(mut progress) = self.progress.lock() else {
            return;
        };
        let Some(current) = progress.get_mut(tag) else {
            return;
        };
        if data.sequence_number <= current.data.sequence_number {
            return;
        }
        current.data = data.clone();
        eprintln!(
            "{}: {} {}%",
            current.status,
            current.title,
            data.value(PROGRESS_FIELD).unwrap_or("?")
        );
    }

    fn hide(&self, tag: &str) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.remove(tag);
        }
    }

    fn show(&self, toast: &Toast) {
        eprintln!("{}", toast.lines.join(" - "));
        for (key, value) in toast.arguments.iter() {
            eprintln!("  {}: {}", key, value);
        }
        self.activations.remember(&toast.arguments);
    }

    fn on_activated(&self, handler: ActivationHandler) {
        self.activations.register(handler);
    }
}
