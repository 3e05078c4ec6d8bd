//! Remote execution over the system `ssh` client.
//!
//! [`Remote`] wraps one host. Commands run with `BatchMode=yes`, so a missing
//! key or an unknown host fails fast instead of prompting. Uploads speak the
//! scp sink protocol from [`crate::scp`] over an ssh session.

use crate::{config::DeployConfig, scp};
use ctlprog_core::retry::{
    Attempt, RetryExhausted, RetryPolicy, TokioSleep, retry_until_success,
};
use std::{
    io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
};
use tokio::process::Command;

/// ssh exits with 255 when the connection itself failed.
const SSH_CONNECTION_FAILED: i32 = 255;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("failed to run ssh: {0}")]
    Spawn(#[source] io::Error),
    #[error("ssh connection to {host} failed: {stderr}")]
    Connect { host: String, stderr: String },
    #[error("`{command}` failed on {host}: {status}")]
    Exit {
        host: String,
        command: String,
        status: ExitStatus,
    },
    #[error("failed to stream {dest} to {host}: {source}")]
    Upload {
        host: String,
        dest: String,
        #[source]
        source: io::Error,
    },
    #[error("service reported {state:?}")]
    NotRunning { state: String },
}

pub type Result<T> = core::result::Result<T, RemoteError>;

/// What the status command said about the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Starting,
    Other(String),
}

/// Classifies status output by its words.
///
/// `running` or `active` wins over `start`, `starting` or `activating`, so
/// upstart's `start/running` counts as running. Anything else, including
/// `inactive` and `failed`, is [`ServiceState::Other`].
pub fn classify_status(output: &str) -> ServiceState {
    let lower = output.to_ascii_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| matches!(*w, "running" | "active")) {
        ServiceState::Running
    } else if words
        .iter()
        .any(|w| matches!(*w, "start" | "starting" | "activating"))
    {
        ServiceState::Starting
    } else {
        ServiceState::Other(output.trim().to_string())
    }
}

/// Turns status output into one poll outcome: running is done, starting asks
/// for an uncounted retry, anything else is a counted failure.
pub fn status_attempt(output: &str) -> core::result::Result<(), Attempt<RemoteError>> {
    match classify_status(output) {
        ServiceState::Running => Ok(()),
        ServiceState::Starting => {
            tracing::debug!("service still starting");
            Err(Attempt::Retry)
        }
        ServiceState::Other(state) => Err(Attempt::Fail(RemoteError::NotRunning { state })),
    }
}

#[derive(Debug, Clone)]
pub struct Remote {
    host: String,
    user: String,
    port: u16,
    identity: Option<PathBuf>,
    retry: RetryPolicy,
}

impl Remote {
    pub fn new(config: &DeployConfig) -> Self {
        Self {
            host: config.host.clone(),
            user: config.ssh_user.clone(),
            port: config.ssh_port,
            identity: config.ssh_identity.clone(),
            retry: config.retry,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Arguments passed to `ssh` to run `script` on the host.
    pub fn ssh_args(&self, script: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ];
        if let Some(identity) = &self.identity {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push(format!("{}@{}", self.user, self.host));
        args.push(script.to_string());
        args
    }

    fn ssh(&self, script: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh_args(script)).kill_on_drop(true);
        cmd
    }

    /// Runs `script`, streaming its output to our stderr.
    #[tracing::instrument(skip(self), fields(host = %self.host))]
    pub async fn run(&self, script: &str) -> Result<()> {
        tracing::info!("running remote command");
        let status = self
            .ssh(script)
            .stdin(Stdio::null())
            .stdout(io::stderr())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(RemoteError::Spawn)?;

        self.check(script, status)
    }

    /// Runs `script` and returns its stdout.
    ///
    /// A non-zero exit from the remote command is not an error here; only a
    /// failed connection is.
    pub async fn capture(&self, script: &str) -> Result<String> {
        let output = self
            .ssh(script)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(RemoteError::Spawn)?;

        if output.status.code() == Some(SSH_CONNECTION_FAILED) {
            return Err(RemoteError::Connect {
                host: self.host.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Retries a no-op command until an SSH session can be opened.
    pub async fn wait_for_ssh(&self) -> core::result::Result<(), RetryExhausted<RemoteError>> {
        retry_until_success::<TokioSleep, _, _, _, _>(&self.retry, || async move {
            let output = self
                .ssh("true")
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| Attempt::Fail(RemoteError::Spawn(e)))?;
            if output.status.success() {
                Ok(())
            } else {
                Err(Attempt::Fail(RemoteError::Connect {
                    host: self.host.clone(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                }))
            }
        })
        .await
    }

    /// Uploads `data` as `dest` in the login directory of the remote user.
    #[tracing::instrument(skip(self, data), fields(host = %self.host, bytes = data.len()))]
    pub async fn put(&self, data: &[u8], dest: &str, mode: u32) -> anyhow::Result<()> {
        self.wait_for_ssh().await?;
        tracing::info!("scp {} bytes to {dest}", data.len());

        let mut child = self
            .ssh(scp::SINK_COMMAND)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(RemoteError::Spawn)?;

        let upload_error = |source: io::Error| RemoteError::Upload {
            host: self.host.clone(),
            dest: dest.to_string(),
            source,
        };

        if let Some(mut stdin) = child.stdin.take() {
            scp::write_file(&mut stdin, mode, dest, data)
                .await
                .map_err(upload_error)?;
            // Closing stdin ends the transfer.
            drop(stdin);
        }

        let status = child.wait().await.map_err(upload_error)?;
        self.check(scp::SINK_COMMAND, status)?;
        Ok(())
    }

    /// Polls `status_command` until the service reports running.
    ///
    /// Starting states are retried without spending the budget.
    pub async fn wait_until_running(
        &self,
        status_command: &str,
    ) -> core::result::Result<(), RetryExhausted<RemoteError>> {
        retry_until_success::<TokioSleep, _, _, _, _>(&self.retry, || async move {
            let output = self.capture(status_command).await.map_err(Attempt::Fail)?;
            status_attempt(&output)
        })
        .await
    }

    /// Maps the exit status of a command whose stderr went to the terminal.
    fn check(&self, command: &str, status: ExitStatus) -> Result<()> {
        match status.code() {
            _ if status.success() => Ok(()),
            Some(SSH_CONNECTION_FAILED) => Err(RemoteError::Connect {
                host: self.host.clone(),
                stderr: "see ssh output above".to_string(),
            }),
            _ => Err(RemoteError::Exit {
                host: self.host.clone(),
                command: command.to_string(),
                status,
            }),
        }
    }
}
