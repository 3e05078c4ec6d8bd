//! # ctlprog-deploy
//!
//! Operator tooling that builds `ctlprog-server` and rolls it out to a single
//! test host over SSH:
//!
//! 1. build the release binary for the host's target triple,
//! 2. stop the running service,
//! 3. upload the binary and its env file through the scp sink protocol,
//! 4. start the service and poll its status until it reports running.
//!
//! Waiting for SSH and for the service both go through
//! [`ctlprog_core::retry::retry_until_success`]; running out of attempts is an
//! error returned to `main`.
//!
//! ## Structure
//!
//! - [`artifact`] - building the server binary.
//! - [`config`] - CLI/env settings.
//! - [`remote`] - ssh command execution and uploads.
//! - [`scp`] - scp sink framing.
//! - [`template`] - `{{key}}` substitution in remote commands.

pub mod artifact;
pub mod config;
pub mod remote;
pub mod scp;
pub mod template;

use config::DeployConfig;
use remote::Remote;

/// Upload mode of both files, as used by the scp sink.
pub const UPLOAD_MODE: u32 = 0o755;

/// Name of the env file on the host.
pub const REMOTE_ENV_FILE: &str = "ctlprog.env";

/// Runs a full rollout.
///
/// # Errors
///
/// Returns the first failing step, including exhausted retries.
#[tracing::instrument(skip_all, fields(host = %config.host, service = %config.service_name))]
pub async fn deploy(config: &DeployConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    let env_file = tokio::fs::read(&config.env_file)
        .await
        .with_context(|| format!("failed to read {}", config.env_file.display()))?;
    let binary = artifact::build_server(&config.src_dir, &config.build_target).await?;

    let remote = Remote::new(config);
    remote.run(&config.stop_command).await?;

    tracing::info!("uploading binaries");
    remote
        .put(&binary, artifact::SERVER_BIN, UPLOAD_MODE)
        .await?;
    remote.put(&env_file, REMOTE_ENV_FILE, UPLOAD_MODE).await?;

    remote.run(&config.start_command).await?;
    remote
        .wait_until_running(&config.status_command)
        .await
        .with_context(|| format!("{} did not come up on {}", config.service_name, remote.host()))?;

    tracing::info!("SUCCESS");
    Ok(())
}
