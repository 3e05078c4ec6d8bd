#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use core::future::IntoFuture;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::{ControlProgramService, router};
use server::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Set by the deploy tool at build time.
const BUILD_TAG: &str = match option_env!("CTLPROG_BUILD_TAG") {
    Some(tag) => tag,
    None => "dev",
};
const BUILD_COMMIT: &str = match option_env!("CTLPROG_BUILD_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};
const BUILD_DATE: &str = match option_env!("CTLPROG_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config);

    let shutdown_timeout = config.shutdown_timeout;
    let app = router(ControlProgramService::new(config));

    // Signalled once a shutdown signal arrives, to bound the drain.
    let draining = Arc::new(Notify::new());
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&draining)))
        .into_future();

    let result = tokio::select! {
        res = serve => res.map_err(anyhow::Error::from),
        () = async {
            draining.notified().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "in-flight requests did not drain in time, shutting down anyway"
            );
            Ok(())
        }
    };

    tracing::info!("Service shut down");
    providers.shutdown();
    result
}

fn log_startup_info(config: &ServerConfig) {
    tracing::info!(
        tag = BUILD_TAG,
        commit = BUILD_COMMIT,
        built = BUILD_DATE,
        "ctlprog-server {}",
        env!("CARGO_PKG_VERSION")
    );
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting control program service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting control program service on {} (max batch size {}, {} seeded accounts)",
            config.server_addr,
            config.max_batch_size,
            config.accounts.len()
        );
    }
}

async fn shutdown_signal(draining: Arc<Notify>) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, draining in-flight requests...");
    draining.notify_one();
}
