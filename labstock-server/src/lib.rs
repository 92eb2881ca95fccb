//! labstock-server: HTTP server for the lab inventory
//!
//! Exposes CRUD over antibodies, plasmids, oligonucleotides, chemicals, and
//! fly stocks plus their batches, comments, files, and requests, behind
//! session-cookie authentication.

pub mod auth;
pub mod db;
pub mod export;
pub mod http;
pub mod models;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use labstock_core::AppConfig;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the application router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.config.server.cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_methods(Any).allow_headers(Any)
    };

    Router::new()
        .merge(http::routes::health::router())
        .nest("/api", http::routes::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server: connect the pool, run migrations, serve until
/// shutdown.
pub async fn serve(config: AppConfig) -> Result<(), ServeError> {
    let pool = db::create_pool(&config.database.url, config.database.max_connections).await?;

    db::migrations::run(&pool).await?;

    // Uploads land under this directory, keyed by database-assigned names.
    std::fs::create_dir_all(&config.storage.upload_dir)?;

    let addr: SocketAddr = config.server.addr.parse()?;
    let state = Arc::new(AppState::new(pool, config));
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("labstock listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server startup error type
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bind address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}
