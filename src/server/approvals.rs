//! Continue endpoints

use super::stream::{SseStream, event_stream, single_event};
use crate::coordinator::{ContinueRequest, RunCoordinator};
use crate::events::{FlattenedResponse, FlowEvent, collect_flattened};
use crate::run::{Decision, FlowError};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

pub fn router() -> Router<RunCoordinator> {
    Router::new()
        .route("/continue", post(continue_flattened))
        .route("/continue-stream", post(continue_stream))
}

/// Continue body as clients send it
///
/// Older clients send `approval_id` and a boolean `approved`.
#[derive(Debug, Deserialize)]
pub struct ContinueBody {
    #[serde(default, alias = "approval_id", alias = "approvalId")]
    pub token: Option<String>,

    #[serde(default)]
    pub decision: Option<Decision>,

    #[serde(default)]
    pub approved: Option<bool>,
}

impl ContinueBody {
    pub fn into_request(self) -> Result<ContinueRequest, FlowError> {
        let token = self
            .token
            .ok_or_else(|| FlowError::validation("token is required"))?;
        let decision = match (self.decision, self.approved) {
            (Some(decision), _) => decision,
            (None, Some(approved)) => Decision::from_approved(approved),
            (None, None) => return Err(FlowError::validation("decision is required")),
        };
        ContinueRequest::new(token, decision).validate()
    }
}

/// POST /api/approvals/continue-stream
///
/// A stale token still answers with a stream: one `error` event, then `[DONE]`.
async fn continue_stream(
    State(coordinator): State<RunCoordinator>,
    body: Result<Json<ContinueBody>, JsonRejection>,
) -> Response {
    let request = body
        .map_err(FlowError::from)
        .and_then(|Json(body)| body.into_request());
    let result = match request {
        Ok(request) => coordinator.continue_run(request).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(stream) => {
            tracing::info!(run_id = %stream.run_id, "Streaming continued run");
            event_stream(stream.events).into_response()
        }
        Err(e @ FlowError::StaleApproval { .. }) => {
            tracing::debug!(error = %e, "Stale approval");
            stream_error(e).into_response()
        }
        Err(e) => e.into_response(),
    }
}

fn stream_error(error: FlowError) -> Sse<SseStream> {
    single_event(FlowEvent::request_error(error.to_string()))
}

/// POST /api/approvals/continue
async fn continue_flattened(
    State(coordinator): State<RunCoordinator>,
    body: Result<Json<ContinueBody>, JsonRejection>,
) -> Result<Json<FlattenedResponse>, FlowError> {
    let Json(body) = body?;
    let stream = coordinator.continue_run(body.into_request()?).await?;
    Ok(Json(collect_flattened(stream.events).await))
}
