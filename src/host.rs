//! Terminal host: drives the plugin the way a launcher would, one query at a
//! time, and prints the ranked results.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context};
use clap::Parser;

use crate::commands;
use crate::core::backend::YtdlpBackend;
use crate::core::clipboard::SystemClipboard;
use crate::core::desktop_notifier::{desktop_available, DesktopNotifier};
use crate::core::notify::{Activations, ConsoleNotifier};
use crate::plugin::ytdlp::YtdlpPlugin;
use crate::plugin::{
    ContextMenu, DelayedQuery, Plugin, PluginApi, PluginInitContext, Query, QueryResult,
    SettingsProvider, Theme, ThemeChangedHandler,
};
use crate::storage::config;
use ytdlp_run_core::core::events::Notifier;
use ytdlp_run_core::fs_paths::{AppPaths, DesktopPaths};

pub const ACTION_KEYWORD: &str = "yt";

#[derive(Parser, Debug)]
#[command(name = "ytdlp-run", version, about = "Pick a yt-dlp quality and download it")]
pub struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Invoke the Nth result (1-based) and wait for the download
    #[arg(long)]
    pub pick: Option<usize>,

    /// Output filename, same as typing it after the URL
    #[arg(long)]
    pub filename: Option<String>,

    /// Report progress on the terminal instead of desktop notifications
    #[arg(long)]
    pub console: bool,

    /// Video URL; reads queries from stdin when omitted
    pub query: Option<String>,
}

impl Cli {
    fn search(&self) -> Option<String> {
        let query = self.query.as_deref()?;
        Some(match self.filename.as_deref() {
            Some(name) if !name.trim().is_empty() => format!("{} {}", query.trim(), name),
            _ => query.to_string(),
        })
    }
}

#[derive(Default)]
pub struct CliApi {
    theme: Mutex<Option<Theme>>,
    handlers: Mutex<Vec<(u64, ThemeChangedHandler)>>,
    next_id: AtomicU64,
}

impl CliApi {
    pub fn set_theme(&self, new: Theme) {
        let old = self.current_theme();
        if let Ok(mut theme) = self.theme.lock() {
            *theme = Some(new);
        }
        if old == new {
            return;
        }
        if let Ok(handlers) = self.handlers.lock() {
            for (_, handler) in handlers.iter() {
                handler(old, new);
            }
        }
    }
}

impl PluginApi for CliApi {
    fn current_theme(&self) -> Theme {
        self.theme
            .lock()
            .ok()
            .and_then(|t| *t)
            .unwrap_or(Theme::Dark)
    }

    fn subscribe_theme_changed(&self, handler: ThemeChangedHandler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push((id, handler));
        }
        id
    }

    fn unsubscribe_theme_changed(&self, subscription: u64) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.retain(|(id, _)| *id != subscription);
        }
    }
}

pub fn parse_theme(name: &str) -> Option<Theme> {
    match name.trim().to_ascii_lowercase().as_str() {
        "light" => Some(Theme::Light),
        "dark" => Some(Theme::Dark),
        "hc1" | "highcontrastone" => Some(Theme::HighContrastOne),
        "hc2" | "highcontrasttwo" => Some(Theme::HighContrastTwo),
        "hcblack" | "highcontrastblack" => Some(Theme::HighContrastBlack),
        "hcwhite" | "highcontrastwhite" => Some(Theme::HighContrastWhite),
        _ => None,
    }
}

/// One interactive line, already split into its command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Pick(usize),
    Copy(usize),
    Open,
    Set { key: String, value: String },
    Patch(String),
    Theme(String),
    Quit,
}

pub fn parse_command(line: &str) -> anyhow::Result<Command> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let Some(rest) = trimmed.strip_prefix(':') else {
        return Ok(Command::Search(trimmed.to_string()));
    };

    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();
    match name {
        "pick" | "p" => Ok(Command::Pick(parse_index(args)?)),
        "copy" | "c" => Ok(Command::Copy(parse_index(args)?)),
        "open" | "o" => Ok(Command::Open),
        "set" => {
            let (key, value) = args.split_once(' ').unwrap_or((args, ""));
            if key.is_empty() {
                bail!("usage: :set KEY VALUE");
            }
            Ok(Command::Set {
                key: key.to_string(),
                value: value.trim().to_string(),
            })
        }
        "patch" => {
            if args.is_empty() {
                bail!("usage: :patch JSON");
            }
            Ok(Command::Patch(args.to_string()))
        }
        "theme" => Ok(Command::Theme(args.to_string())),
        "quit" | "q" => Ok(Command::Quit),
        other => Err(anyhow!("unknown command ':{}'", other)),
    }
}

fn parse_index(arg: &str) -> anyhow::Result<usize> {
    let n: usize = arg
        .parse()
        .with_context(|| format!("'{}' is not a result number", arg))?;
    if n == 0 {
        bail!("results are numbered from 1");
    }
    Ok(n)
}

/// Desktop notifications unless `console` is set or no notification server
/// answers.
fn notifier_for(console: bool) -> (Arc<dyn Notifier>, Activations) {
    if !console && desktop_available() {
        let notifier = Arc::new(DesktopNotifier::new());
        let activations = notifier.activations();
        return (notifier, activations);
    }
    if !console {
        tracing::info!("no notification server, reporting progress on the terminal");
    }
    let notifier = Arc::new(ConsoleNotifier::new());
    let activations = notifier.activations();
    (notifier, activations)
}

pub struct Host {
    plugin: YtdlpPlugin,
    activations: Activations,
    api: Arc<CliApi>,
    results: Vec<QueryResult>,
}

impl Host {
    pub fn new(settings_path: PathBuf, console: bool) -> anyhow::Result<Self> {
        config::read_settings(&settings_path)
            .with_context(|| format!("Failed to read settings {}", settings_path.display()))?;

        let (notifier, activations) = notifier_for(console);
        let api = Arc::new(CliApi::default());
        let mut plugin = YtdlpPlugin::new(
            Arc::new(YtdlpBackend::new()),
            notifier,
            Arc::new(SystemClipboard),
        )?;
        plugin.init(PluginInitContext {
            api: api.clone(),
            settings_path: Some(settings_path),
        });

        Ok(Self {
            plugin,
            activations,
            api,
            results: Vec::new(),
        })
    }

    /// Runs both query passes and remembers the results for `pick`/`copy`.
    pub fn search(&mut self, search: &str, out: &mut impl Write) -> anyhow::Result<()> {
        let query = Query::with_keyword(ACTION_KEYWORD, search);

        let first = self.plugin.query(&query);
        let delayed = self.plugin.query_delayed(&query, true);
        self.results = if delayed.is_empty() { first } else { delayed };
        self.results.sort_by(|a, b| b.score.cmp(&a.score));

        for (i, result) in self.results.iter().enumerate() {
            writeln!(out, "{:>3}. {}", i + 1, result.title)?;
            writeln!(out, "     {}", result.sub_title)?;
        }
        Ok(())
    }

    pub fn pick(&self, n: usize) -> anyhow::Result<()> {
        let result = self.result(n)?;
        if result.action.is_none() {
            bail!("result {} has no action", n);
        }
        result.invoke();
        Ok(())
    }

    pub fn copy(&self, n: usize) -> anyhow::Result<()> {
        let result = self.result(n)?;
        let menu = self.plugin.load_context_menus(result);
        let item = menu
            .first()
            .ok_or_else(|| anyhow!("result {} has no context menu", n))?;
        (item.action)();
        Ok(())
    }

    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut options = self.plugin.additional_options();
        let option = options
            .iter_mut()
            .find(|o| o.key == key)
            .ok_or_else(|| anyhow!("unknown setting '{}'", key))?;
        option.text_value = value.to_string();
        self.plugin.update_settings(&options);
        Ok(())
    }

    pub fn patch(&self, json: &str) -> anyhow::Result<()> {
        let updated = commands::settings::apply_patch(&self.plugin.settings(), json)?;
        self.plugin.replace_settings(updated);
        Ok(())
    }

    pub fn theme(&self, name: &str) -> anyhow::Result<()> {
        let theme = parse_theme(name).ok_or_else(|| anyhow!("unknown theme '{}'", name))?;
        self.api.set_theme(theme);
        Ok(())
    }

    pub fn open_last(&self) -> bool {
        self.activations.activate_last()
    }

    pub fn finish(mut self) {
        self.plugin.wait_for_downloads();
        self.plugin.dispose();
    }

    fn result(&self, n: usize) -> anyhow::Result<&QueryResult> {
        n.checked_sub(1)
            .and_then(|i| self.results.get(i))
            .ok_or_else(|| anyhow!("no result {}", n))
    }

    /// Reads commands until `:quit` or end of input. Command errors are
    /// printed and the loop continues.
    pub fn repl(&mut self, input: impl BufRead, out: &mut impl Write) -> anyhow::Result<()> {
        for line in input.lines() {
            let line = line.context("Failed to read stdin")?;
            let command = match parse_command(&line) {
                Ok(c) => c,
                Err(e) => {
                    writeln!(out, "error: {:#}", e)?;
                    continue;
                }
            };

            let outcome = match command {
                Command::Quit => break,
                Command::Search(search) => self.search(&search, out),
                Command::Pick(n) => self.pick(n),
                Command::Copy(n) => self.copy(n),
                Command::Open => {
                    if !self.open_last() {
                        writeln!(out, "nothing to open")?;
                    }
                    Ok(())
                }
                Command::Set { key, value } => self.set(&key, &value),
                Command::Patch(json) => self.patch(&json),
                Command::Theme(name) => self.theme(&name),
            };
            if let Err(e) = outcome {
                writeln!(out, "error: {:#}", e)?;
            }
        }
        Ok(())
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| DesktopPaths.settings_file());
    tracing::debug!("settings file: {}", settings_path.display());

    let mut host = Host::new(settings_path, cli.console)?;
    let stdout = std::io::stdout();

    match cli.search() {
        Some(search) => {
            host.search(&search, &mut stdout.lock())?;
            if let Some(n) = cli.pick {
                host.pick(n)?;
            }
        }
        None => {
            if cli.pick.is_some() {
                bail!("--pick needs a query");
            }
            host.repl(std::io::stdin().lock(), &mut stdout.lock())?;
        }
    }

    host.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interactive_commands() {
        assert_eq!(parse_command(":pick 2").unwrap(), Command::Pick(2));
        assert_eq!(parse_command(":copy 1").unwrap(), Command::Copy(1));
        assert_eq!(parse_command(":open").unwrap(), Command::Open);
        assert_eq!(parse_command(":quit").unwrap(), Command::Quit);
        assert_eq!(
            parse_command(":set output_dir /srv/my videos").unwrap(),
            Command::Set {
                key: "output_dir".into(),
                value: "/srv/my videos".into()
            }
        );
        assert_eq!(
            parse_command("https://a.test/v clip").unwrap(),
            Command::Search("https://a.test/v clip".into())
        );
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(parse_command(":pick 0").is_err());
        assert!(parse_command(":pick two").is_err());
        assert!(parse_command(":set").is_err());
        assert!(parse_command(":frobnicate").is_err());
    }

    #[test]
    fn cli_filename_is_appended_to_query() {
        let cli = Cli::parse_from(["ytdlp-run", "--filename", "my clip", "https://a.test/v"]);
        assert_eq!(cli.search().as_deref(), Some("https://a.test/v my clip"));

        let cli = Cli::parse_from(["ytdlp-run", "--pick", "1", "https://a.test/v"]);
        assert_eq!(cli.pick, Some(1));
        assert_eq!(cli.search().as_deref(), Some("https://a.test/v"));

        let cli = Cli::parse_from(["ytdlp-run"]);
        assert!(cli.search().is_none());
        assert!(!cli.console);

        let cli = Cli::parse_from(["ytdlp-run", "--console", "https://a.test/v"]);
        assert!(cli.console);
    }

    #[test]
    fn cli_api_notifies_theme_subscribers() {
        let api = CliApi::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = api.subscribe_theme_changed(Arc::new(move |old: Theme, new: Theme| {
            sink.lock().unwrap().push((old, new));
        }));

        api.set_theme(Theme::Light);
        api.set_theme(Theme::Light);
        api.unsubscribe_theme_changed(id);
        api.set_theme(Theme::Dark);

        assert_eq!(*seen.lock().unwrap(), vec![(Theme::Dark, Theme::Light)]);
        assert_eq!(api.current_theme(), Theme::Dark);
    }

    #[test]
    fn theme_names() {
        assert_eq!(parse_theme("Light"), Some(Theme::Light));
        assert_eq!(parse_theme("hcwhite"), Some(Theme::HighContrastWhite));
        assert_eq!(parse_theme("sepia"), None);
    }

    #[test]
    fn unreadable_settings_file_is_a_host_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Host::new(path, true).is_err());
    }

    #[test]
    fn repl_reports_errors_and_keeps_going() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = Host::new(dir.path().join("settings.json"), true).unwrap();
        let input = b"\n:pick 3\n:set filename_template %(id)s.%(ext)s\n:quit\nnever read\n";
        let mut out = Vec::new();

        host.repl(&input[..], &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("No search query"));
        assert!(text.contains("error: no result 3"));
        assert!(!text.contains("never read"));
        assert_eq!(host.plugin.settings().filename_template, "%(id)s.%(ext)s");
        assert!(config::load_settings(&dir.path().join("settings.json"))
            .filename_template
            .starts_with("%(id)s"));
        host.finish();
    }
}
