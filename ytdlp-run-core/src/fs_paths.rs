use std::path::PathBuf;

pub trait AppPaths: Send + Sync {
    fn config_dir(&self) -> PathBuf;
    fn bin_dir(&self) -> Option<PathBuf>;

    fn settings_file(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }
}

#[cfg(feature = "desktop")]
pub struct DesktopPaths;

#[cfg(feature = "desktop")]
impl AppPaths for DesktopPaths {
    fn config_dir(&self) -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("ytdlp-run"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("ytdlp-run").join("bin"))
    }
}
