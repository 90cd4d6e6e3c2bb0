use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio_util::task::TaskTracker;

use crate::commands;
use crate::core::backend::MediaBackend;
use crate::core::clipboard::Clipboard;
use crate::core::url_parser::SearchInput;
use crate::models::media::{FormatOption, VideoData, BEST_FORMAT_LABEL, BEST_FORMAT_SELECTOR};
use crate::models::settings::PluginSettings;
use crate::plugin::download_job::{DownloadLauncher, DownloadSpec};
use crate::plugin::session::{FetchView, QueryLifecycle};
use crate::plugin::{
    ContextData, ContextMenu, ContextMenuResult, DelayedQuery, Plugin, PluginAdditionalOption,
    PluginApi, PluginInitContext, Query, QueryResult, ResultAction, SettingsProvider, Theme,
    ToolTipData,
};
use crate::storage::config;
use ytdlp_run_core::core::events::Notifier;

pub const PLUGIN_ID: &str = "323D66BA5A384DA3A443F5302B10CC3D";
pub const PLUGIN_NAME: &str = "YTDLP";
pub const PLUGIN_DESCRIPTION: &str = "Download videos with yt-dlp";

const LIGHT_ICON: &str = "Images/ytdlp.light.png";
const DARK_ICON: &str = "Images/ytdlp.dark.png";

const NO_QUERY_TITLE: &str = "No search query";
const NO_QUERY_SUBTITLE: &str = "Paste a video URL, optionally followed by a filename";
const INVALID_URL_TITLE: &str = "Enter a valid URL";
const INVALID_URL_SUBTITLE: &str = "Only absolute http(s) links are supported";
const LOADING_TITLE: &str = "Loading qualities...";
const FETCH_ERROR_TITLE: &str = "An error occurred while fetching URL";
const FETCH_ERROR_SUBTITLE: &str = "Please check the URL and try again";

pub fn icon_path_for(theme: Theme) -> &'static str {
    match theme {
        Theme::Light | Theme::HighContrastWhite => LIGHT_ICON,
        _ => DARK_ICON,
    }
}

pub struct YtdlpPlugin {
    runtime: tokio::runtime::Runtime,
    lifecycle: Arc<QueryLifecycle>,
    launcher: DownloadLauncher,
    clipboard: Arc<dyn Clipboard>,
    settings: Arc<RwLock<PluginSettings>>,
    settings_path: Option<PathBuf>,
    icon_path: Arc<RwLock<String>>,
    api: Option<Arc<dyn PluginApi>>,
    theme_subscription: Option<u64>,
    downloads: TaskTracker,
    disposed: bool,
}

impl YtdlpPlugin {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        notifier: Arc<dyn Notifier>,
        clipboard: Arc<dyn Clipboard>,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("ytdlp-run")
            .build()?;

        let settings = Arc::new(RwLock::new(PluginSettings::default()));
        let downloads = TaskTracker::new();
        let lifecycle = Arc::new(QueryLifecycle::new(
            runtime.handle().clone(),
            backend.clone(),
        ));
        let launcher = DownloadLauncher::new(
            runtime.handle().clone(),
            backend,
            notifier,
            settings.clone(),
            downloads.clone(),
        );

        Ok(Self {
            runtime,
            lifecycle,
            launcher,
            clipboard,
            settings,
            settings_path: None,
            icon_path: Arc::new(RwLock::new(DARK_ICON.to_string())),
            api: None,
            theme_subscription: None,
            downloads,
            disposed: false,
        })
    }

    pub fn settings(&self) -> PluginSettings {
        match self.settings.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the settings wholesale and persists them when the host gave
    /// a settings path.
    pub fn replace_settings(&self, updated: PluginSettings) {
        match self.settings.write() {
            Ok(mut s) => *s = updated.clone(),
            Err(poisoned) => *poisoned.into_inner() = updated.clone(),
        }
        if let Some(path) = &self.settings_path {
            if let Err(e) = config::save_settings(path, &updated) {
                tracing::warn!("failed to save settings: {:#}", e);
            }
        }
    }

    pub fn icon_path(&self) -> String {
        match self.icon_path.read() {
            Ok(p) => p.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Blocks until every started download has finished. No new downloads can
    /// be started afterwards.
    pub fn wait_for_downloads(&self) {
        self.downloads.close();
        self.runtime.block_on(self.downloads.wait());
    }

    fn set_icon_path(&self, theme: Theme) {
        set_icon(&self.icon_path, theme);
    }

    fn info_result(&self, title: &str, sub_title: &str, search: &str) -> QueryResult {
        QueryResult {
            query_text_display: search.to_string(),
            ico_path: self.icon_path(),
            title: title.to_string(),
            sub_title: sub_title.to_string(),
            tool_tip_data: Some(ToolTipData::new(title, sub_title)),
            score: 0,
            action: None,
            context_data: Some(ContextData::Search(search.to_string())),
        }
    }

    fn download_action(&self, spec: DownloadSpec) -> ResultAction {
        let lifecycle = self.lifecycle.clone();
        let launcher = self.launcher.clone();
        Arc::new(move || {
            lifecycle.clear();
            launcher.start(spec.clone());
            true
        })
    }

    fn first_pass(&self, search: &str) -> Vec<QueryResult> {
        if search.trim().is_empty() {
            return vec![self.info_result(NO_QUERY_TITLE, NO_QUERY_SUBTITLE, search)];
        }

        let input = SearchInput::parse(search);
        if !input.has_valid_url() {
            return vec![self.info_result(INVALID_URL_TITLE, INVALID_URL_SUBTITLE, search)];
        }

        let settings = self.settings();
        match self.lifecycle.begin(&input, &settings) {
            FetchView::Pending { .. } => self.placeholder_results(&input, search),
            view => self.render(view, search),
        }
    }

    fn second_pass(&self, search: &str) -> Vec<QueryResult> {
        let input = SearchInput::parse(search);
        if search.trim().is_empty() || !input.has_valid_url() {
            return Vec::new();
        }

        let settings = self.settings();
        let view = self.lifecycle.wait(&input, &settings);
        self.render(view, search)
    }

    fn placeholder_results(&self, input: &SearchInput, search: &str) -> Vec<QueryResult> {
        let icon = self.icon_path();
        let best = QueryResult {
            query_text_display: search.to_string(),
            ico_path: icon.clone(),
            title: input.url.clone(),
            sub_title: format!("Quality: {}", BEST_FORMAT_LABEL),
            tool_tip_data: Some(ToolTipData::new(&input.url, BEST_FORMAT_LABEL)),
            score: 2,
            action: Some(self.download_action(DownloadSpec {
                title: input.url.clone(),
                url: input.url.clone(),
                selector: BEST_FORMAT_SELECTOR.to_string(),
                filename: input.filename.clone(),
            })),
            context_data: Some(ContextData::Search(search.to_string())),
        };

        let mut loading = self.info_result(LOADING_TITLE, &input.url, search);
        loading.ico_path = icon;
        loading.score = 1;

        vec![best, loading]
    }

    fn render(&self, view: FetchView, search: &str) -> Vec<QueryResult> {
        match view {
            FetchView::Ready { video, filename } => self.format_results(&video, filename, search),
            FetchView::Failed { .. } => {
                vec![self.info_result(FETCH_ERROR_TITLE, FETCH_ERROR_SUBTITLE, search)]
            }
            FetchView::Pending { .. } | FetchView::Canceled | FetchView::Busy => Vec::new(),
        }
    }

    fn format_results(
        &self,
        video: &VideoData,
        filename: Option<String>,
        search: &str,
    ) -> Vec<QueryResult> {
        let icon = self.icon_path();
        let options = video.ranked_options();
        let total = options.len();

        options
            .into_iter()
            .enumerate()
            .map(|(i, option)| QueryResult {
                query_text_display: search.to_string(),
                ico_path: icon.clone(),
                title: video.title.clone(),
                sub_title: format!("Quality: {}", option.label),
                tool_tip_data: Some(ToolTipData::new(&video.title, &tooltip_text(&option))),
                score: (total - i) as i32,
                action: Some(self.download_action(DownloadSpec {
                    title: video.title.clone(),
                    url: option.url.clone(),
                    selector: option.selector.clone(),
                    filename: filename.clone(),
                })),
                context_data: Some(ContextData::Format {
                    url: option.url,
                    format: option.label,
                }),
            })
            .collect()
    }
}

fn tooltip_text(option: &FormatOption) -> String {
    if option.details.is_empty() {
        option.label.clone()
    } else {
        format!("{}\n{}", option.label, option.details)
    }
}

fn set_icon(slot: &RwLock<String>, theme: Theme) {
    let path = icon_path_for(theme).to_string();
    match slot.write() {
        Ok(mut p) => *p = path,
        Err(poisoned) => *poisoned.into_inner() = path,
    }
}

impl Plugin for YtdlpPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn description(&self) -> &str {
        PLUGIN_DESCRIPTION
    }

    fn init(&mut self, context: PluginInitContext) {
        if let Some(path) = &context.settings_path {
            let loaded = config::load_settings(path);
            match self.settings.write() {
                Ok(mut s) => *s = loaded,
                Err(poisoned) => *poisoned.into_inner() = loaded,
            }
        }
        self.settings_path = context.settings_path;

        self.set_icon_path(context.api.current_theme());
        let icon_path = self.icon_path.clone();
        let subscription = context
            .api
            .subscribe_theme_changed(Arc::new(move |_old: Theme, new: Theme| set_icon(&icon_path, new)));
        self.theme_subscription = Some(subscription);
        self.api = Some(context.api);

        let settings = self.settings();
        tracing::info!(
            "{} initialized (yt-dlp: {}, output: {})",
            PLUGIN_NAME,
            settings.ytdlp_path.display(),
            settings.output_dir.display()
        );
    }

    fn query(&self, query: &Query) -> Vec<QueryResult> {
        self.first_pass(&query.search)
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let (Some(api), Some(subscription)) = (&self.api, self.theme_subscription.take()) {
            api.unsubscribe_theme_changed(subscription);
        }
        self.disposed = true;
    }
}

impl DelayedQuery for YtdlpPlugin {
    fn query_delayed(&self, query: &Query, delayed_execution: bool) -> Vec<QueryResult> {
        if delayed_execution {
            self.second_pass(&query.search)
        } else {
            self.first_pass(&query.search)
        }
    }
}

impl ContextMenu for YtdlpPlugin {
    fn load_context_menus(&self, selected: &QueryResult) -> Vec<ContextMenuResult> {
        let Some(ContextData::Search(search)) = &selected.context_data else {
            return Vec::new();
        };

        let clipboard = self.clipboard.clone();
        let search = search.clone();
        vec![ContextMenuResult {
            plugin_name: PLUGIN_NAME.to_string(),
            title: "Copy to clipboard (Ctrl+C)".into(),
            font_family: "Segoe MDL2 Assets".into(),
            glyph: "\u{E8C8}".into(),
            accelerator: Some("Ctrl+C".into()),
            action: Arc::new(move || {
                if let Err(e) = clipboard.set_text(&search) {
                    tracing::warn!("copy to clipboard failed: {:#}", e);
                }
                true
            }),
        }]
    }
}

impl SettingsProvider for YtdlpPlugin {
    fn additional_options(&self) -> Vec<PluginAdditionalOption> {
        commands::settings::additional_options(&self.settings())
    }

    fn update_settings(&self, options: &[PluginAdditionalOption]) {
        let updated = commands::settings::apply_options(&self.settings(), options);
        self.replace_settings(updated);
    }
}

impl Drop for YtdlpPlugin {
    fn drop(&mut self) {
        self.dispose();
    }
}
