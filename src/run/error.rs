//! Error taxonomy for workflow runs

use std::fmt;
use thiserror::Error;

/// Why an approval token could not be redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Never issued, already consumed, or evicted
    UnknownToken,
    /// The run is no longer waiting for a decision
    NotSuspended,
    /// The run moved past the checkpoint the token was minted for
    CursorMoved,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::UnknownToken => write!(f, "not found or expired"),
            StaleReason::NotSuspended => write!(f, "run is not awaiting a decision"),
            StaleReason::CursorMoved => write!(f, "run has moved past this checkpoint"),
        }
    }
}

/// Errors surfaced by the run engine
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// Malformed start/continue request, rejected before a run exists
    #[error("invalid request: {message}")]
    Validation { message: String },

    /// No definition for the requested workflow type
    #[error("workflow '{workflow}' not found")]
    WorkflowNotFound { workflow: String },

    /// Router picked an id outside the definition's allow-list
    #[error("router selected unknown specialist '{specialist}' for workflow '{workflow}'")]
    UnknownSpecialist { workflow: String, specialist: String },

    /// Router collaborator failed
    #[error("routing failed: {message}")]
    Routing { message: String },

    /// Token unknown, consumed, or no longer matching its run
    #[error("approval '{token}' {reason}, please retry")]
    StaleApproval { token: String, reason: StaleReason },

    /// A step executor failed; the run is terminally failed
    #[error("step '{step}' failed: {message}")]
    StepExecution { step: String, message: String },

    /// A prompt or result template failed to render
    #[error("template error in {origin}: {message}")]
    Template { origin: String, message: String },

    /// Internal state machine misuse
    #[error("invalid transition: {message}")]
    InvalidTransition { message: String },
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn workflow_not_found(workflow: impl Into<String>) -> Self {
        Self::WorkflowNotFound {
            workflow: workflow.into(),
        }
    }

    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    pub fn stale(token: impl Into<String>, reason: StaleReason) -> Self {
        Self::StaleApproval {
            token: token.into(),
            reason,
        }
    }

    pub fn step_execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn template(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    /// Whether the error was raised before any run was created
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            FlowError::Validation { .. }
                | FlowError::WorkflowNotFound { .. }
                | FlowError::UnknownSpecialist { .. }
                | FlowError::Routing { .. }
                | FlowError::StaleApproval { .. }
        )
    }
}
