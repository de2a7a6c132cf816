use std::path::PathBuf;
use std::process::Command;

use serde::Serialize;
use tracing::{debug, warn};

/// Outcome of a SYSTEM_COMMAND shell run.
#[derive(Debug, Clone, Serialize)]
pub struct ShellOutput {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Open a file, folder, or URL with the platform's default handler.
pub fn open_path(path: &str) -> bool {
    let status = if cfg!(target_os = "macos") {
        Command::new("open").arg(path).status()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", "", path]).status()
    } else {
        Command::new("xdg-open").arg(path).status()
    };

    match status {
        Ok(s) if s.success() => {
            debug!(path, "opened with system handler");
            true
        }
        Ok(s) => {
            warn!(path, code = ?s.code(), "system handler refused");
            false
        }
        Err(err) => {
            warn!(path, %err, "open failed");
            false
        }
    }
}

/// Launch a bare program name, no shell involved.
pub fn spawn_program(program: &str) -> bool {
    if cfg!(target_os = "macos") {
        Command::new("open")
            .args(["-a", program])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    } else {
        Command::new(program).spawn().is_ok()
    }
}

/// Run a command line through the OS shell, capturing output.
pub fn run_shell(command: &str) -> std::io::Result<ShellOutput> {
    let output = if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", command]).output()?
    } else {
        Command::new("sh").args(["-c", command]).output()?
    };
    Ok(ShellOutput {
        returncode: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Fire-and-forget shell launch, for app hints that are shell lines rather
/// than program paths.
pub fn shell_launch(command: &str) -> bool {
    let spawned = if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", "", command]).spawn()
    } else {
        Command::new("sh").args(["-c", command]).spawn()
    };
    spawned.is_ok()
}

/// Browser-opening seam; stubbed in dispatcher tests.
pub trait WebControl: Send + Sync {
    fn open_url(&self, url: &str) -> bool;
}

pub struct SystemWeb;

impl WebControl for SystemWeb {
    fn open_url(&self, url: &str) -> bool {
        open_path(url)
    }
}

/// Expand `~`, `$VAR`, and `%VAR%` placeholders in a path template.
pub fn expand_path(template: &str) -> PathBuf {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    if template.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            out.push_str(&home.display().to_string());
            chars.next();
        }
    }

    while let Some(ch) = chars.next() {
        match ch {
            '%' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '%' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if closed {
                    out.push_str(&std::env::var(&name).unwrap_or_default());
                } else {
                    out.push('%');
                    out.push_str(&name);
                }
            }
            '$' => {
                let mut name = String::new();
                while let Some(c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    out.push('$');
                } else {
                    out.push_str(&std::env::var(&name).unwrap_or_default());
                }
            }
            other => out.push(other),
        }
    }

    PathBuf::from(out)
}
