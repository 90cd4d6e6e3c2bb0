use anyhow::Context;

use crate::models::settings::{
    PluginSettings, KEY_FILENAME_TEMPLATE, KEY_OUTPUT_DIR, KEY_YTDLP_PATH,
};
use crate::plugin::PluginAdditionalOption;

const OPTIONS: &[(&str, &str, &str)] = &[
    (
        KEY_YTDLP_PATH,
        "yt-dlp path",
        "Path to the yt-dlp executable, or a bare name to look it up on PATH",
    ),
    (
        KEY_OUTPUT_DIR,
        "Output folder",
        "Folder downloads are written to",
    ),
    (
        KEY_FILENAME_TEMPLATE,
        "Default filename template",
        "yt-dlp output template used when no filename is typed, e.g. %(title)s.%(ext)s",
    ),
];

/// The settings surface shown by the host, filled with the current values.
pub fn additional_options(settings: &PluginSettings) -> Vec<PluginAdditionalOption> {
    OPTIONS
        .iter()
        .map(|(key, label, description)| PluginAdditionalOption {
            key: key.to_string(),
            display_label: label.to_string(),
            display_description: description.to_string(),
            text_value: settings.option_value(key).unwrap_or_default(),
        })
        .collect()
}

pub fn apply_options(
    current: &PluginSettings,
    options: &[PluginAdditionalOption],
) -> PluginSettings {
    let mut updated = current.clone();
    for option in options {
        if !updated.apply_option(&option.key, &option.text_value) {
            tracing::warn!("ignoring unknown setting '{}'", option.key);
        }
    }
    updated
}

/// Merges a partial JSON object into the current settings.
pub fn apply_patch(current: &PluginSettings, partial: &str) -> anyhow::Result<PluginSettings> {
    let patch: serde_json::Value = serde_json::from_str(partial).context("Invalid JSON")?;
    let mut current_val = serde_json::to_value(current).context("Serialize")?;
    merge_json(&mut current_val, &patch);
    serde_json::from_value(current_val).context("Deserialize")
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            match base_obj.get_mut(key) {
                Some(existing) if existing.is_object() && value.is_object() => {
                    merge_json(existing, value);
                }
                _ => {
                    base_obj.insert(key.clone(), value.clone());
                }
            }
        }
    }
}
