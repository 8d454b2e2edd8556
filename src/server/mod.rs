//! HTTP boundary: start/continue over SSE plus non-streamed fallbacks

mod approvals;
mod error;
mod runs;
mod stream;
mod workflows;

pub use approvals::ContinueBody;
pub use workflows::WorkflowSummary;

use crate::coordinator::RunCoordinator;
use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete application router
pub fn app(coordinator: RunCoordinator) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", axum::routing::get(health_check))
        .nest("/api/workflows", workflows::router())
        .nest("/api/runs", runs::router())
        .nest("/api/approvals", approvals::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator)
}

/// Bind and serve until `shutdown` resolves
pub async fn serve(
    coordinator: RunCoordinator,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid address {}:{}", host, port))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr().context("Failed to get local address")?;

    let sweeper = coordinator.spawn_sweeper();
    tracing::info!(
        addr = %local_addr,
        workflows = coordinator.context().catalog.len(),
        "flowgate listening"
    );

    let result = axum::serve(listener, app(coordinator))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error");

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!("Server stopped");
    result
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "flowgate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
