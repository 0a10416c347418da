use crate::error::AuthError;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

/// Opens the provider's authorization page for the user.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), AuthError>;
}

/// Hands the URL to the platform's default browser launcher.
pub struct SystemBrowser;

#[cfg(target_os = "macos")]
const LAUNCHER: (&str, &[&str]) = ("open", &[]);

#[cfg(target_os = "windows")]
const LAUNCHER: (&str, &[&str]) = ("cmd", &["/C", "start", ""]);

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const LAUNCHER: (&str, &[&str]) = ("xdg-open", &[]);

/// Start `program` and reap it from a background thread, so launchers that
/// exit immediately do not linger as zombies.
fn spawn_detached(
    program: &Path,
    args: &[&str],
    url: &str,
) -> std::io::Result<JoinHandle<Option<ExitStatus>>> {
    // stdout carries the MCP stream, so the launcher must not inherit it.
    let mut child = Command::new(program)
        .args(args)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(thread::spawn(move || child.wait().ok()))
}

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        tracing::info!("opening auth url: {url}");

        let (program, args) = LAUNCHER;
        let Ok(path) = which::which(program) else {
            tracing::warn!("{program} not found; open this URL manually to authorize: {url}");
            return Ok(());
        };

        spawn_detached(&path, args, url)
            .map(|_| ())
            .map_err(|e| AuthError::Browser(format!("{program}: {e}")))
    }
}
