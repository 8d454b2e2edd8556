//! Core types and traits for step execution

use crate::step::StepSpec;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors a step collaborator can report
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// Request timed out
    #[error("timeout after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Connection or transport failure
    #[error("network error: {message}")]
    Network { message: String },

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Failed to parse the collaborator's response
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Collaborator ran but reported failure
    #[error("{message}")]
    Failed { message: String },
}

impl ExecutorError {
    /// Check if this error is worth retrying at the transport level
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutorError::Timeout { .. } | ExecutorError::Network { .. } => true,
            ExecutorError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Everything a collaborator sees when executing one step
#[derive(Debug, Clone, Serialize)]
pub struct StepRequest {
    pub run_id: String,
    pub workflow: String,
    pub step: StepSpec,

    /// Run input, always a JSON object
    pub input: serde_json::Value,

    /// Conversation history supplied at start
    pub prior_turns: Vec<serde_json::Value>,

    /// Results of the steps completed so far, keyed by step id
    pub prior_results: BTreeMap<String, serde_json::Value>,

    /// Specialist chosen by the router, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

/// Result payload of a successful step
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub payload: serde_json::Value,

    /// Executor that produced it
    pub executor: String,

    pub duration: Duration,
}

impl StepOutput {
    pub fn new(
        payload: serde_json::Value,
        executor: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            payload,
            executor: executor.into(),
            duration,
        }
    }
}

/// Executes one step of a run
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute the step and return its result payload
    async fn execute(&self, request: &StepRequest) -> Result<StepOutput, ExecutorError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Transport-level retry policy for collaborators
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries
    pub max_retries: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy from agent config
    pub fn from_config(config: &crate::config::AgentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Add up to 25% jitter
            let jitter = rand::random::<f64>() * 0.25 * capped_delay;
            capped_delay + jitter
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}
