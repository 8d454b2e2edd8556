//! HTTP mapping of run errors

use crate::run::FlowError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// A body that is not JSON, or not the expected shape, is a malformed request
impl From<JsonRejection> for FlowError {
    fn from(rejection: JsonRejection) -> Self {
        FlowError::validation(rejection.body_text())
    }
}

impl FlowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FlowError::Validation { .. } => StatusCode::BAD_REQUEST,
            FlowError::WorkflowNotFound { .. } => StatusCode::NOT_FOUND,
            FlowError::StaleApproval { .. } => StatusCode::CONFLICT,
            FlowError::UnknownSpecialist { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            FlowError::Routing { .. } => StatusCode::BAD_GATEWAY,
            FlowError::StepExecution { .. }
            | FlowError::Template { .. }
            | FlowError::InvalidTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if !self.is_request_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
