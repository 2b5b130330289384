#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use relayd::config::{Args, ServerConfig};
use relayd::metrics::{start_metrics_server, HealthState};
use relayd::run_with_shutdown;
use relayd::server::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config: ServerConfig = args.into();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let state = Arc::new(ServerState::new(config.clone()));

    // Bind failure is fatal: the relay must not run half-initialized.
    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);

    let health_state = HealthState::new();

    tokio::spawn({
        let health_state = health_state.clone();
        async move {
            if let Err(e) = start_metrics_server(config.metrics_addr, health_state).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    let (shutdown_tx, _) = tokio::sync::watch::channel(());
    let mut server_task = tokio::spawn(run_with_shutdown(
        listener,
        state,
        shutdown_tx.clone(),
    ));

    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Err(e)) => tracing::error!("server error: {}", e),
                Err(e) => tracing::error!("server task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            // Breaks the accept loop; in-flight connections get drained.
            let _ = shutdown_tx.send(());
            match server_task.await {
                Ok(Err(e)) => tracing::error!("server error during drain: {}", e),
                Err(e) => tracing::error!("server task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    Ok(())
}
