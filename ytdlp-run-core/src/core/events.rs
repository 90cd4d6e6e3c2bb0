use std::collections::BTreeMap;

pub const PROGRESS_TAG: &str = "yt-dlp-download";
pub const PROGRESS_FIELD: &str = "progressValue";

/// Bindable values of a progress notification. Updates carrying a lower
/// sequence number than the one on screen are dropped by the sink.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationData {
    pub sequence_number: u32,
    pub values: BTreeMap<String, String>,
}

impl NotificationData {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressToast {
    pub tag: String,
    pub heading: String,
    pub title: String,
    pub status: String,
    pub data: NotificationData,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToastArguments(BTreeMap<String, String>);

impl ToastArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub lines: Vec<String>,
    pub arguments: ToastArguments,
}

impl Toast {
    pub fn new(heading: &str) -> Self {
        Self {
            lines: vec![heading.to_string()],
            arguments: ToastArguments::new(),
        }
    }

    pub fn text(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn argument(mut self, key: &str, value: impl Into<String>) -> Self {
        self.arguments = self.arguments.add(key, value);
        self
    }

    pub fn heading(&self) -> &str {
        self.lines.first().map(|s| s.as_str()).unwrap_or("")
    }
}

pub type ActivationHandler = Box<dyn Fn(&ToastArguments) + Send + Sync>;

pub trait Notifier: Send + Sync + 'static {
    fn show_progress(&self, toast: &ProgressToast);
    fn update_progress(&self, tag: &str, data: &NotificationData);
    fn hide(&self, tag: &str);
    fn show(&self, toast: &Toast);
    fn on_activated(&self, handler: ActivationHandler);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toast_builder_keeps_heading_first() {
        let toast = Toast::new("Download complete")
            .text("Click to open file location")
            .argument("path", "/tmp/a.mp4");
        assert_eq!(toast.heading(), "Download complete");
        assert_eq!(toast.lines.len(), 2);
        assert_eq!(toast.arguments.get("path"), Some("/tmp/a.mp4"));
    }

    #[test]
    fn notification_data_values() {
        let data = NotificationData::new(3).with_value(PROGRESS_FIELD, "42.5");
        assert_eq!(data.sequence_number, 3);
        assert_eq!(data.value(PROGRESS_FIELD), Some("42.5"));
        assert_eq!(data.value("missing"), None);
    }
}
