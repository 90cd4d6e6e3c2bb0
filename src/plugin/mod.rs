//! Launcher host contract.
//!
//! A host creates the plugin, calls [`Plugin::init`] once, then drives it with
//! [`Plugin::query`] (first pass, must not block) followed by
//! [`DelayedQuery::query_delayed`] (second pass, may block briefly). Selected
//! results run their [`ResultAction`]; the returned flag tells the host
//! whether to hide its window.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub mod download_job;
pub mod session;
pub mod ytdlp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
    HighContrastOne,
    HighContrastTwo,
    HighContrastBlack,
    HighContrastWhite,
}

pub type ThemeChangedHandler = Arc<dyn Fn(Theme, Theme) + Send + Sync>;

pub trait PluginApi: Send + Sync {
    fn current_theme(&self) -> Theme;
    fn subscribe_theme_changed(&self, handler: ThemeChangedHandler) -> u64;
    fn unsubscribe_theme_changed(&self, subscription: u64);
}

#[derive(Clone)]
pub struct PluginInitContext {
    pub api: Arc<dyn PluginApi>,
    /// Where the host keeps this plugin's settings. `None` keeps them in memory.
    pub settings_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub raw_query: String,
    pub action_keyword: String,
    pub search: String,
}

impl Query {
    pub fn new(search: &str) -> Self {
        Self {
            raw_query: search.to_string(),
            action_keyword: String::new(),
            search: search.to_string(),
        }
    }

    pub fn with_keyword(action_keyword: &str, search: &str) -> Self {
        Self {
            raw_query: format!("{} {}", action_keyword, search),
            action_keyword: action_keyword.to_string(),
            search: search.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolTipData {
    pub title: String,
    pub text: String,
}

impl ToolTipData {
    pub fn new(title: &str, text: &str) -> Self {
        Self {
            title: title.to_string(),
            text: text.to_string(),
        }
    }
}

pub type ResultAction = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextData {
    Search(String),
    Format { url: String, format: String },
}

#[derive(Clone, Default)]
pub struct QueryResult {
    pub query_text_display: String,
    pub ico_path: String,
    pub title: String,
    pub sub_title: String,
    pub tool_tip_data: Option<ToolTipData>,
    pub score: i32,
    pub action: Option<ResultAction>,
    pub context_data: Option<ContextData>,
}

impl QueryResult {
    /// Runs the result's action. Results without one leave the host open.
    pub fn invoke(&self) -> bool {
        match &self.action {
            Some(action) => action(),
            None => false,
        }
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("title", &self.title)
            .field("sub_title", &self.sub_title)
            .field("score", &self.score)
            .field("has_action", &self.action.is_some())
            .field("context_data", &self.context_data)
            .finish()
    }
}

#[derive(Clone)]
pub struct ContextMenuResult {
    pub plugin_name: String,
    pub title: String,
    pub font_family: String,
    pub glyph: String,
    pub accelerator: Option<String>,
    pub action: ResultAction,
}

impl fmt::Debug for ContextMenuResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextMenuResult")
            .field("plugin_name", &self.plugin_name)
            .field("title", &self.title)
            .field("accelerator", &self.accelerator)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginAdditionalOption {
    pub key: String,
    pub display_label: String,
    pub display_description: String,
    pub text_value: String,
}

pub trait Plugin {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn init(&mut self, context: PluginInitContext);
    fn query(&self, query: &Query) -> Vec<QueryResult>;
    fn dispose(&mut self);
}

pub trait DelayedQuery {
    fn query_delayed(&self, query: &Query, delayed_execution: bool) -> Vec<QueryResult>;
}

pub trait ContextMenu {
    fn load_context_menus(&self, selected: &QueryResult) -> Vec<ContextMenuResult>;
}

pub trait SettingsProvider {
    fn additional_options(&self) -> Vec<PluginAdditionalOption>;
    fn update_settings(&self, options: &[PluginAdditionalOption]);
}
