//! Start endpoints

use super::stream::{RunSse, event_stream};
use crate::coordinator::{RunCoordinator, StartRequest};
use crate::events::{FlattenedResponse, collect_flattened};
use crate::run::FlowError;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};

pub fn router() -> Router<RunCoordinator> {
    Router::new()
        .route("/", post(start_flattened))
        .route("/stream", post(start_stream))
}

/// POST /api/runs/stream
async fn start_stream(
    State(coordinator): State<RunCoordinator>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Result<RunSse, FlowError> {
    let Json(request) = body?;
    let stream = coordinator.start(request).await?;
    tracing::info!(run_id = %stream.run_id, "Streaming run");
    Ok(event_stream(stream.events))
}

/// POST /api/runs, for clients that cannot read a stream
async fn start_flattened(
    State(coordinator): State<RunCoordinator>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<FlattenedResponse>, FlowError> {
    let Json(request) = body?;
    let stream = coordinator.start(request).await?;
    Ok(Json(collect_flattened(stream.events).await))
}
