//! Events streamed to a run observer

use crate::run::StepInstance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One event in a run's stream
///
/// Every status change produces a `Step` event carrying the full step list.
/// `ApprovalRequired`, `Response` and `Error` always end a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    Step {
        run_id: String,
        step: StepInstance,
        all_steps: Vec<StepInstance>,
    },
    ApprovalRequired {
        run_id: String,
        token: String,
        title: String,
        message: String,
        details: BTreeMap<String, String>,
        all_steps: Vec<StepInstance>,
    },
    Response {
        run_id: String,
        content: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        content: String,
    },
}

impl FlowEvent {
    /// Whether this event ends the stream it is sent on
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowEvent::Step { .. })
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            FlowEvent::Step { run_id, .. }
            | FlowEvent::ApprovalRequired { run_id, .. }
            | FlowEvent::Response { run_id, .. } => Some(run_id),
            FlowEvent::Error { run_id, .. } => run_id.as_deref(),
        }
    }

    /// Step snapshot carried by the event, if any
    pub fn all_steps(&self) -> Option<&[StepInstance]> {
        match self {
            FlowEvent::Step { all_steps, .. } | FlowEvent::ApprovalRequired { all_steps, .. } => {
                Some(all_steps)
            }
            _ => None,
        }
    }

    /// Error event not tied to any run
    pub fn request_error(content: impl Into<String>) -> Self {
        FlowEvent::Error {
            run_id: None,
            content: content.into(),
        }
    }
}
