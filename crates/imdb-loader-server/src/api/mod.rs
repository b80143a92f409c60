pub mod response;

use axum::{routing::get, Json, Router};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::acquire::{AcquisitionOrchestrator, Catalogue, Decompressor, Fetcher};
use crate::config::Config;
use crate::features::{self, datasets::types::HealthResponse, FeatureState};
use crate::middleware;
use crate::storage::SharedBackend;

/// Wire the pipeline components for `backend`
pub fn build_state(config: &Config, backend: SharedBackend) -> anyhow::Result<FeatureState> {
    let catalogue = Catalogue::imdb(&config.datasets_base_url)?;
    let fetcher = Fetcher::new(&config.fetch)?;
    let decompressor = Decompressor::new(&config.extract);

    Ok(FeatureState {
        orchestrator: Arc::new(AcquisitionOrchestrator::new(catalogue, fetcher, decompressor)),
        backend,
    })
}

pub fn create_router(state: FeatureState, config: &Config) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(features::router(state))
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

pub async fn serve(config: Config, backend: SharedBackend) -> anyhow::Result<()> {
    let state = build_state(&config, backend)?;
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    let signalled = Arc::new(Notify::new());
    let notify = Arc::clone(&signalled);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            notify.notify_one();
        })
        .into_future();

    let timeout_secs = config.server.shutdown_timeout_secs;
    let drain_deadline = async {
        signalled.notified().await;
        info!("Waiting up to {} seconds for connections to close", timeout_secs);
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => warn!("Shutdown timeout elapsed with requests still in flight"),
    }

    info!("Server shut down");
    Ok(())
}

async fn root() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "IMDb Dataset Downloader is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
