use std::sync::Arc;

use vocab_srs::config::Config;
use vocab_srs::logging;
use vocab_srs::state::SrsState;
use vocab_srs::workers::WorkerManager;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.logging);

    tracing::info!(
        desired_retention = config.scheduler.desired_retention,
        maximum_interval_days = config.scheduler.maximum_interval_days,
        min_samples = config.optimizer.min_samples,
        "vocab-srs starting"
    );

    let state = Arc::new(SrsState::in_memory(config));

    let worker_manager = match WorkerManager::new(Arc::clone(&state)).await {
        Ok(manager) => {
            if let Err(e) = manager.start().await {
                tracing::error!(error = %e, "failed to start workers");
            }
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(error = %e, "worker manager not initialized");
            None
        }
    };

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    if let Some(ref manager) = worker_manager {
        manager.stop().await;
    }

    tracing::info!(
        uptime_seconds = state.uptime_seconds(),
        "Graceful shutdown complete"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
