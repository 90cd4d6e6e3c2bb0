use std::path::Path;

use anyhow::Context;

use crate::core::process;

/// Opens the file manager with `path` selected (or its folder where the
/// platform has no select option).
pub fn reveal_file(path: &Path) -> anyhow::Result<()> {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        process::std_command("explorer")
            .raw_arg(format!("/select,\"{}\"", path.display()))
            .spawn()
            .context("failed to start explorer")?;
    }

    #[cfg(target_os = "macos")]
    {
        process::std_command("open")
            .arg("-R")
            .arg(path)
            .spawn()
            .context("failed to start open")?;
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let dir = path.parent().unwrap_or(path);
        process::std_command("xdg-open")
            .arg(dir)
            .spawn()
            .context("failed to start xdg-open")?;
    }

    tracing::info!("[reveal] {}", path.display());
    Ok(())
}
