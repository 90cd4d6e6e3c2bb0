use std::io::Write;
use std::process::Stdio;

use anyhow::{anyhow, Context};

use crate::core::process;

pub trait Clipboard: Send + Sync {
    fn set_text(&self, text: &str) -> anyhow::Result<()>;
}

/// Writes to the system clipboard through `arboard`, falling back to the
/// platform clipboard tools (e.g. `wl-copy` on Wayland sessions arboard cannot
/// reach).
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: &str) -> anyhow::Result<()> {
        let writers = writers();
        let used = copy_with(&writers, text)?;
        tracing::info!("[clipboard] copied {} chars with {}", text.len(), used);
        Ok(())
    }
}

type Writer = Box<dyn Fn(&str) -> anyhow::Result<()>>;

fn writers() -> Vec<(&'static str, Writer)> {
    let mut writers: Vec<(&'static str, Writer)> =
        vec![("arboard", Box::new(set_with_arboard) as Writer)];
    for &(program, args) in candidates() {
        let write = move |text: &str| pipe_to(program, args, text);
        writers.push((program, Box::new(write) as Writer));
    }
    writers
}

/// Tries each writer in order, returning the name of the one that worked.
fn copy_with<'a>(writers: &'a [(&'a str, Writer)], text: &str) -> anyhow::Result<&'a str> {
    for (name, write) in writers {
        match write(text) {
            Ok(()) => return Ok(*name),
            Err(e) => tracing::debug!("[clipboard] {} unavailable: {:#}", name, e),
        }
    }
    Err(anyhow!("No clipboard available"))
}

fn set_with_arboard(text: &str) -> anyhow::Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("open clipboard")?;
    clipboard
        .set_text(text.to_owned())
        .context("write clipboard")?;
    Ok(())
}

type Tool = (&'static str, &'static [&'static str]);

const WINDOWS_TOOLS: &[Tool] = &[("clip", &[])];
const MACOS_TOOLS: &[Tool] = &[("pbcopy", &[])];
const UNIX_TOOLS: &[Tool] = &[
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

fn candidates() -> &'static [Tool] {
    if cfg!(target_os = "windows") {
        WINDOWS_TOOLS
    } else if cfg!(target_os = "macos") {
        MACOS_TOOLS
    } else {
        UNIX_TOOLS
    }
}

fn pipe_to(program: &str, args: &[&str], text: &str) -> anyhow::Result<()> {
    let mut child = process::std_command(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("{} failed: {}", program, stderr.trim()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn arboard_is_tried_before_platform_tools() {
        let names: Vec<_> = writers().iter().map(|(name, _)| *name).collect();
        assert_eq!(names[0], "arboard");
        assert_eq!(names.len(), 1 + candidates().len());
    }

    fn recording(calls: &Arc<Mutex<Vec<String>>>, name: &'static str, ok: bool) -> Writer {
        let calls = calls.clone();
        Box::new(move |text: &str| {
            calls.lock().unwrap().push(format!("{}:{}", name, text));
            if ok {
                Ok(())
            } else {
                Err(anyhow!("{} missing", name))
            }
        })
    }

    #[test]
    fn falls_back_until_a_writer_succeeds() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let writers = vec![
            ("arboard", recording(&calls, "arboard", false)),
            ("wl-copy", recording(&calls, "wl-copy", true)),
            ("xclip", recording(&calls, "xclip", true)),
        ];

        assert_eq!(copy_with(&writers, "https://a.test/v").unwrap(), "wl-copy");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["arboard:https://a.test/v", "wl-copy:https://a.test/v"]
        );
    }

    #[test]
    fn no_working_writer_is_an_error() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let writers = vec![("arboard", recording(&calls, "arboard", false))];
        let err = copy_with(&writers, "x").unwrap_err();
        assert_eq!(err.to_string(), "No clipboard available");
    }
}
