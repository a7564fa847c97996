use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{info, warn};

use super::{services, state::AppState};
use crate::config::Config;
use crate::export::ArtifactStore;
use crate::fetcher::{HttpConfig, HttpFetcher};
use crate::ledger::FjallStore;
use crate::scheduler::DownloadScheduler;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the control API router
pub fn router(state: AppState) -> Router {
    let max_in_flight = state.config.api.max_in_flight;

    Router::new()
        .route("/tasks", post(services::create_task).get(services::list_tasks))
        .route("/tasks/clear-completed", post(services::clear_completed))
        .route(
            "/tasks/{id}",
            get(services::get_task).delete(services::delete_task),
        )
        .route("/tasks/{id}/start", post(services::start_task))
        .route("/tasks/{id}/resume", post(services::resume_task))
        .route("/tasks/{id}/pause", post(services::pause_task))
        .route("/tasks/{id}/cancel", post(services::cancel_task))
        .route(
            "/tasks/{id}/chapters/{index}/retry",
            post(services::retry_chapter),
        )
        .route("/tasks/{id}/export", post(services::export_task))
        .route("/stats", get(services::stats))
        .route("/health", get(services::health))
        .with_state(state)
        // Gzip request bodies are inflated before handlers apply size limits
        .layer(RequestDecompressionLayer::new())
        .layer(ConcurrencyLimitLayer::new(max_in_flight))
}

/// Wire the production collaborators and serve until Ctrl+C / SIGTERM
pub async fn run(address: SocketAddr, config: Config) -> Result<(), AnyError> {
    info!(path = %config.server.ledger_path.display(), "Opening task ledger");
    let store = FjallStore::open(&config.server.ledger_path)
        .map_err(|e| format!("Failed to open ledger: {}", e))?;

    info!(path = %config.server.export_path.display(), "Opening export store");
    let sink = ArtifactStore::local(&config.server.export_path)
        .map_err(|e| format!("Failed to open export store: {}", e))?;

    let fetcher = HttpFetcher::new(HttpConfig::from(&config.fetcher))
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

    let scheduler = DownloadScheduler::new(
        &config,
        Arc::new(fetcher),
        Arc::new(store),
        Arc::new(sink),
    );
    let restored = scheduler.restore().await?;
    info!(tasks = restored, "Scheduler ready");

    let flusher = scheduler.spawn_flusher(config.scheduler.flush_interval());
    let state = AppState::new(config, scheduler.clone());
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "novelbox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Final task map flush failed");
    }
    let _ = flusher.await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
