use crate::template;
use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use ctlprog_core::retry::RetryPolicy;
use std::path::PathBuf;

/// Settings for one rollout of `ctlprog-server` to a test host.
///
/// Parsed from CLI arguments or environment variables, after loading a `.env`
/// file from the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ctlprog-deploy",
    version,
    about = "Builds ctlprog-server and deploys it to a test host over SSH"
)]
pub struct CliArgs {
    /// Address of the host to deploy to.
    ///
    /// Environment variable: `TESTNET_IP`
    #[arg(long, env = "TESTNET_IP")]
    pub host: String,

    /// Environment variable: `SSH_USER`
    #[arg(long, env = "SSH_USER", default_value_t = String::from("ubuntu"))]
    pub ssh_user: String,

    /// Environment variable: `SSH_PORT`
    #[arg(long, env = "SSH_PORT", default_value_t = 22)]
    pub ssh_port: u16,

    /// Private key passed to `ssh -i`. Without it, ssh falls back to the
    /// agent and its own configuration.
    ///
    /// Environment variable: `SSH_IDENTITY`
    #[arg(long, env = "SSH_IDENTITY")]
    pub ssh_identity: Option<PathBuf>,

    /// Root of the workspace to build from.
    ///
    /// Environment variable: `SRC_DIR`
    #[arg(long, env = "SRC_DIR", default_value = ".")]
    pub src_dir: PathBuf,

    /// Env file uploaded next to the binary, relative to `--src-dir`.
    ///
    /// Environment variable: `ENV_FILE`
    #[arg(long, env = "ENV_FILE", default_value = "crates/ctlprog-deploy/ctlprog.env")]
    pub env_file: PathBuf,

    /// Name substituted for `{{service}}` in the command templates.
    ///
    /// Environment variable: `SERVICE_NAME`
    #[arg(long, env = "SERVICE_NAME", default_value_t = String::from("ctlprog"))]
    pub service_name: String,

    /// Target triple of the remote host.
    ///
    /// Environment variable: `BUILD_TARGET`
    #[arg(long, env = "BUILD_TARGET", default_value_t = String::from("x86_64-unknown-linux-gnu"))]
    pub build_target: String,

    /// Counted failures tolerated while waiting for SSH or the service.
    ///
    /// Environment variable: `RETRY_ATTEMPTS`
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 5)]
    pub retry_attempts: u32,

    /// Pause between attempts, in milliseconds.
    ///
    /// Environment variable: `RETRY_INTERVAL_MS`
    #[arg(long, env = "RETRY_INTERVAL_MS", default_value_t = 500)]
    pub retry_interval_ms: u64,

    /// Environment variable: `STOP_COMMAND`
    #[arg(long, env = "STOP_COMMAND", default_value_t = String::from("sudo systemctl stop {{service}} || true"))]
    pub stop_command: String,

    /// Environment variable: `START_COMMAND`
    #[arg(long, env = "START_COMMAND", default_value_t = String::from("sudo systemctl start {{service}}"))]
    pub start_command: String,

    /// Its output decides whether the service is up: `running` or `active`
    /// means done, `start`, `starting` or `activating` means wait.
    ///
    /// Environment variable: `STATUS_COMMAND`
    #[arg(long, env = "STATUS_COMMAND", default_value_t = String::from("systemctl is-active {{service}}"))]
    pub status_command: String,
}

/// Validated deploy settings with the command templates already rendered.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub host: String,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub ssh_identity: Option<PathBuf>,
    pub src_dir: PathBuf,
    pub env_file: PathBuf,
    pub service_name: String,
    pub build_target: String,
    pub retry: RetryPolicy,
    pub stop_command: String,
    pub start_command: String,
    pub status_command: String,
}

impl TryFrom<CliArgs> for DeployConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let host = args.host.trim().to_string();
        if host.is_empty() {
            bail!("TESTNET_IP must not be empty");
        }
        if args.ssh_user.is_empty() {
            bail!("SSH_USER must not be empty");
        }
        if args.retry_attempts == 0 {
            bail!("RETRY_ATTEMPTS must be greater than 0");
        }

        let vars = [
            ("service", args.service_name.as_str()),
            ("host", host.as_str()),
            ("user", args.ssh_user.as_str()),
        ];
        let stop_command = template::render(&args.stop_command, &vars);
        let start_command = template::render(&args.start_command, &vars);
        let status_command = template::render(&args.status_command, &vars);

        Ok(Self {
            env_file: args.src_dir.join(&args.env_file),
            retry: RetryPolicy::new(
                args.retry_attempts,
                Duration::from_millis(args.retry_interval_ms),
            ),
            host,
            ssh_user: args.ssh_user,
            ssh_port: args.ssh_port,
            ssh_identity: args.ssh_identity,
            src_dir: args.src_dir,
            service_name: args.service_name,
            build_target: args.build_target,
            stop_command,
            start_command,
            status_command,
        })
    }
}

/// Fully spelled-out arguments, independent of the process environment.
#[cfg(test)]
impl CliArgs {
    pub(crate) fn for_host(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ssh_user: "ubuntu".to_string(),
            ssh_port: 22,
            ssh_identity: None,
            src_dir: PathBuf::from("."),
            env_file: PathBuf::from("crates/ctlprog-deploy/ctlprog.env"),
            service_name: "ctlprog".to_string(),
            build_target: "x86_64-unknown-linux-gnu".to_string(),
            retry_attempts: 5,
            retry_interval_ms: 500,
            stop_command: "sudo systemctl stop {{service}} || true".to_string(),
            start_command: "sudo systemctl start {{service}}".to_string(),
            status_command: "systemctl is-active {{service}}".to_string(),
        }
    }
}
