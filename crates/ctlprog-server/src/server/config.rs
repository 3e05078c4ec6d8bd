use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `ctlprog-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file in the working directory is loaded first), with defaults suitable for
/// local use.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ctlprog-server",
    version,
    about = "An HTTP service for creating account control programs in batches"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Maximum number of sub-requests accepted in one batch.
    ///
    /// Larger batches are rejected before any work starts. Every accepted
    /// sub-request runs on its own task, so this is also the upper bound on
    /// the fan-out of a single call.
    ///
    /// Environment variable: `MAX_BATCH_SIZE`
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 10_000)]
    pub max_batch_size: usize,

    /// Accounts to seed the in-memory registry with, as comma-separated
    /// `alias=account_id` pairs.
    ///
    /// Example: "treasury=acc-1,payroll=acc-2"
    ///
    /// Environment variable: `ACCOUNTS`
    #[arg(long, env = "ACCOUNTS", default_value_t = String::new())]
    pub accounts: String,

    /// Seconds to wait for in-flight requests after a shutdown signal.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub max_batch_size: usize,
    pub accounts: Vec<(String, String)>,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_batch_size == 0 {
            bail!("MAX_BATCH_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            max_batch_size: args.max_batch_size,
            accounts: parse_accounts(&args.accounts)?,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

/// Parses `alias=id,alias=id` into pairs. Blank entries are skipped.
fn parse_accounts(raw: &str) -> anyhow::Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((alias, id)) = entry.split_once('=') else {
            bail!("ACCOUNTS entry {entry:?} is not of the form alias=account_id");
        };
        let (alias, id) = (alias.trim(), id.trim());
        if alias.is_empty() || id.is_empty() {
            bail!("ACCOUNTS entry {entry:?} has an empty alias or account id");
        }
        pairs.push((alias.to_string(), id.to_string()));
    }
    Ok(pairs)
}
