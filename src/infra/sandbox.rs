//! External sandbox command invocation
//!
//! Builds the argument vectors for the isolated build tool. Every
//! invocation is pinned to a slot via `--uniqueext`, so concurrent
//! builds get disjoint sandbox instances and a failed instance can be
//! found again by its slot number.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::SandboxError;

/// Wrapper around the configured sandbox command.
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    command: String,
    config_path: PathBuf,
}

impl SandboxRunner {
    /// Create a runner for `command` using the given sandbox config.
    pub fn new(command: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            config_path: config_path.into(),
        }
    }

    fn base_args(&self, slot: usize) -> Vec<String> {
        vec![
            "-r".to_string(),
            self.config_path.display().to_string(),
            "--uniqueext".to_string(),
            slot.to_string(),
        ]
    }

    /// Command that rebuilds `source` in the slot's sandbox, leaving
    /// results in `resultdir` and the sandbox in place afterwards.
    pub fn rebuild_command(&self, slot: usize, resultdir: &Path, source: &str) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.base_args(slot))
            .arg("--resultdir")
            .arg(resultdir)
            .arg("--rebuild")
            .arg("--no-cleanup-after")
            .arg(source);
        cmd
    }

    /// Command that discards the slot's sandbox.
    pub fn clean_command(&self, slot: usize) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.base_args(slot)).arg("--clean");
        cmd
    }

    /// Human-readable form of the clean invocation, for log messages.
    pub fn clean_command_line(&self, slot: usize) -> String {
        let mut parts = vec![self.command.clone()];
        parts.extend(self.base_args(slot));
        parts.push("--clean".to_string());
        shell_join(parts)
    }

    /// Query the slot's sandbox filesystem root.
    pub async fn print_root_path(&self, slot: usize) -> Result<String, SandboxError> {
        let output = Command::new(&self.command)
            .args(self.base_args(slot))
            .arg("--print-root")
            .output()
            .await
            .map_err(|e| SandboxError::Spawn {
                command: self.command.clone(),
                error: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(SandboxError::CommandFailed {
                command: format!("{} --print-root", self.command),
                status: output.status.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// The literal command a human can paste to enter the slot's
    /// sandbox.
    pub fn shell_command_line(&self, slot: usize) -> String {
        let mut parts = vec![self.command.clone()];
        parts.extend(self.base_args(slot));
        parts.push("--shell".to_string());
        shell_join(parts)
    }
}

/// Join command parts into one shell-safe line.
pub fn shell_join(parts: impl IntoIterator<Item = String>) -> String {
    parts
        .into_iter()
        .map(|part| shell_quote(&part))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+@%,".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}
