//! Start and continue requests

use crate::run::{Decision, FlowError};
use serde::Deserialize;

/// Request to start a run
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    #[serde(alias = "workflowType")]
    pub workflow_type: String,

    #[serde(default)]
    pub input: serde_json::Value,

    #[serde(default, alias = "priorTurns")]
    pub prior_turns: Vec<serde_json::Value>,
}

impl StartRequest {
    pub fn new(workflow_type: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            input,
            prior_turns: Vec::new(),
        }
    }

    /// Reject malformed requests and normalize the input to an object
    ///
    /// A bare string becomes `{ "message": ... }`; other scalars and arrays
    /// are wrapped as `{ "value": ... }`.
    pub fn validate(mut self) -> Result<Self, FlowError> {
        self.workflow_type = self.workflow_type.trim().to_string();
        if self.workflow_type.is_empty() {
            return Err(FlowError::validation("workflow_type must not be empty"));
        }

        self.input = match self.input {
            serde_json::Value::Object(map) => serde_json::Value::Object(map),
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            serde_json::Value::String(message) => {
                if message.trim().is_empty() {
                    return Err(FlowError::validation("input message must not be empty"));
                }
                serde_json::json!({ "message": message })
            }
            other => serde_json::json!({ "value": other }),
        };
        Ok(self)
    }
}

/// Request to resume a suspended run
#[derive(Debug, Clone, PartialEq)]
pub struct ContinueRequest {
    pub token: String,
    pub decision: Decision,
}

impl ContinueRequest {
    pub fn new(token: impl Into<String>, decision: Decision) -> Self {
        Self {
            token: token.into(),
            decision,
        }
    }

    pub fn validate(self) -> Result<Self, FlowError> {
        if self.token.trim().is_empty() {
            return Err(FlowError::validation("token must not be empty"));
        }
        Ok(self)
    }
}
