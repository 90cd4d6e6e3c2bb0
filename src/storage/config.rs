use std::path::Path;

use anyhow::Context;

use crate::models::settings::PluginSettings;

/// `Ok(None)` when the file does not exist yet.
pub fn read_settings(path: &Path) -> anyhow::Result<Option<PluginSettings>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let settings = serde_json::from_str::<PluginSettings>(&raw)
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(Some(settings))
}

pub fn load_settings(path: &Path) -> PluginSettings {
    match read_settings(path) {
        Ok(Some(settings)) => settings,
        Ok(None) => PluginSettings::default(),
        Err(e) => {
            tracing::warn!("using default settings: {:#}", e);
            PluginSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &PluginSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert!(read_settings(&path).unwrap().is_none());
        assert_eq!(load_settings(&path), PluginSettings::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = PluginSettings {
            ytdlp_path: PathBuf::from("/opt/bin/yt-dlp"),
            output_dir: PathBuf::from("/srv/videos"),
            filename_template: "%(id)s.%(ext)s".into(),
            ..PluginSettings::default()
        };

        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path), settings);
    }

    #[test]
    fn corrupt_file_is_an_error_but_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(read_settings(&path).is_err());
        assert_eq!(load_settings(&path), PluginSettings::default());
    }
}
