use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;

use clawctl_types::truncate;

use crate::{Error, Result};

/// Fixed budget for the JSON status commands.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Subprocess wrapper around the external runtime binary.
#[derive(Debug, Clone)]
pub struct OpenclawClient {
    bin: String,
}

impl OpenclawClient {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run the binary with `args`, capturing stdout/stderr. The child is
    /// killed when the timeout elapses; the timeout is fatal to this call
    /// only.
    pub async fn exec(&self, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Error::Command(format!("ENOENT: {} not found", self.bin))
                } else {
                    Error::Io(err)
                }
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "{} {} exceeded {}ms",
                    self.bin,
                    args.first().map(String::as_str).unwrap_or(""),
                    timeout.as_millis()
                ))
            })??;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    /// `bin status.all.json` — live session telemetry.
    pub async fn status_all(&self) -> Result<Value> {
        self.exec_json("status.all.json").await
    }

    /// `bin models.list.all.json` — known model catalog.
    pub async fn models_list(&self) -> Result<Value> {
        self.exec_json("models.list.all.json").await
    }

    /// `bin models.status.json` — provider auth/oauth state.
    pub async fn models_status(&self) -> Result<Value> {
        self.exec_json("models.status.json").await
    }

    async fn exec_json(&self, command: &str) -> Result<Value> {
        let output = self.exec(&[command.to_string()], STATUS_TIMEOUT).await?;
        if !output.success() {
            return Err(Error::Command(format!(
                "{command} exited {:?}: {}",
                output.exit_code,
                truncate(output.stderr.trim(), 400)
            )));
        }
        serde_json::from_str(&output.stdout).map_err(|err| {
            Error::Command(format!(
                "{command} produced invalid JSON ({err}): {}",
                truncate(output.stdout.trim(), 400)
            ))
        })
    }
}
