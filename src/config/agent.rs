//! Agent configuration for step executors

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How an agent is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Remote agent behind an HTTP endpoint
    Http,
    /// Fixed payload rendered from templates
    Static,
    /// Echoes the request back
    Echo,
}

/// Configuration for a single step-executing agent
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Endpoint URL for HTTP agents
    pub url: Option<String>,

    /// Bearer token sent to HTTP agents
    pub api_key: Option<String>,

    /// Extra headers for HTTP agents
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Static payload (string leaves are templates)
    pub output: Option<serde_json::Value>,

    /// Whether this agent is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Timeout in seconds for requests
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Transport-level retries for transient failures
    #[serde(default)]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    60
}

fn default_retry_delay() -> u64 {
    500
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            headers: HashMap::new(),
            output: None,
            enabled: true,
            timeout: default_timeout(),
            max_retries: 0,
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl AgentConfig {
    /// Infer the agent kind from the configured fields
    pub fn kind(&self) -> AgentKind {
        if self.url.is_some() {
            AgentKind::Http
        } else if self.output.is_some() {
            AgentKind::Static
        } else {
            AgentKind::Echo
        }
    }

    /// URL with `~` and `$VAR` expanded
    pub fn resolved_url(&self) -> Option<String> {
        self.url.as_deref().map(expand)
    }

    /// API key with `$VAR` expanded; empty results are dropped
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(expand)
            .filter(|key| !key.is_empty())
    }

    /// Headers with values expanded
    pub fn resolved_headers(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .map(|(k, v)| (k.clone(), expand(v)))
            .collect()
    }
}

/// Expand `~` and environment variables, leaving the input untouched on failure
fn expand(value: &str) -> String {
    match shellexpand::full(value) {
        Ok(expanded) => expanded.into_owned(),
        Err(e) => {
            tracing::warn!(value, error = %e, "Failed to expand config value");
            value.to_string()
        }
    }
}
