use clap::Parser;
use ctlprog_deploy::config::{CliArgs, DeployConfig};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Load from .env
    let _ = dotenvy::dotenv();

    if let Err(e) = init_logging() {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    let config = match DeployConfig::try_from(CliArgs::parse()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match ctlprog_deploy::deploy(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("deploy failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_writer(std::io::stderr),
        )
        .try_init()?;
    Ok(())
}
