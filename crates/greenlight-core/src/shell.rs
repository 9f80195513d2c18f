//! Shell hooks: run an operator-configured command with extra environment.
//!
//! Build, test and deployment backends are all external programs named in
//! `greenlight.toml`. Each is run through `sh -c` with `GREENLIGHT_*`
//! variables describing the work, and is killed if it outlives its timeout.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
}

/// Captured result of a finished hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    /// Last non-empty stdout line, trimmed.
    pub fn last_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .next_back()
    }

    /// Short failure description: exit code plus the tail of stderr.
    pub fn failure_summary(&self) -> String {
        let code = self
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let tail: Vec<&str> = self.stderr.lines().rev().take(5).collect();
        if tail.is_empty() {
            format!("exit {code}")
        } else {
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            format!("exit {code}: {}", tail.join(" | "))
        }
    }
}

/// Run `command` through `sh -c`.
pub async fn run_shell(
    command: &str,
    envs: &[(&str, String)],
    timeout: Duration,
) -> Result<ShellOutput, ShellError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    debug!(%command, "running hook");

    let child = cmd.spawn().map_err(|e| ShellError::Spawn {
        command: command.to_string(),
        reason: e.to_string(),
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ShellError::Spawn {
                command: command.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            return Err(ShellError::TimedOut {
                command: command.to_string(),
                timeout,
            });
        }
    };

    Ok(ShellOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
