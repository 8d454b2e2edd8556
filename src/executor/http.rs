//! HTTP agent executor

use super::types::{ExecutorError, StepExecutor, StepOutput, StepRequest};
use crate::config::AgentConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Executor that POSTs the step request to a remote agent
///
/// The agent answers with a JSON document, which becomes the step result.
/// An object carrying a `result` field is unwrapped to that field.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    /// Agent name
    name: String,

    /// Endpoint URL
    url: String,

    /// Bearer token (if required)
    api_key: Option<String>,

    /// Extra request headers
    headers: HashMap<String, String>,

    /// Request timeout
    timeout: Duration,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Create a new HTTP executor from agent config
    pub fn from_config(
        name: impl Into<String>,
        config: &AgentConfig,
    ) -> Result<Self, ExecutorError> {
        let name = name.into();
        let url = config
            .resolved_url()
            .ok_or_else(|| ExecutorError::config(format!("agent '{}' has no url", name)))?;

        let mut executor = Self::new(name, url)?.with_timeout(Duration::from_secs(config.timeout));
        executor.api_key = config.resolved_api_key();
        executor.headers = config.resolved_headers();
        Ok(executor)
    }

    /// Create a new HTTP executor with explicit parameters
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ExecutorError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            api_key: None,
            headers: HashMap::new(),
            timeout: Duration::from_secs(60),
            client,
        })
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Map a failed response to an ExecutorError
pub(crate) fn map_http_error(
    status: reqwest::StatusCode,
    body: &str,
    timeout: Duration,
) -> ExecutorError {
    match status.as_u16() {
        408 | 504 => ExecutorError::timeout(timeout),
        code => ExecutorError::Http {
            status: code,
            body: body.chars().take(512).collect(),
        },
    }
}

/// Map a reqwest transport error to an ExecutorError
pub(crate) fn map_send_error(e: reqwest::Error, elapsed: Duration) -> ExecutorError {
    if e.is_timeout() {
        ExecutorError::timeout(elapsed)
    } else if e.is_connect() {
        ExecutorError::network(format!("connection failed: {}", e))
    } else {
        ExecutorError::network(format!("request failed: {}", e))
    }
}

#[async_trait]
impl StepExecutor for HttpExecutor {
    async fn execute(&self, request: &StepRequest) -> Result<StepOutput, ExecutorError> {
        let start = Instant::now();

        let mut http_request = self.client.post(&self.url).json(request);
        if let Some(ref key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", key));
        }
        for (name, value) in &self.headers {
            http_request = http_request.header(name.as_str(), value.as_str());
        }

        let result = tokio::time::timeout(self.timeout, http_request.send()).await;
        let elapsed = start.elapsed();

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(map_send_error(e, elapsed)),
            Err(_) => return Err(ExecutorError::timeout(elapsed)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body, self.timeout));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExecutorError::parse(format!("failed to parse response: {}", e)))?;

        let payload = match body {
            serde_json::Value::Object(mut map) if map.contains_key("result") => {
                map.remove("result").unwrap_or_default()
            }
            other => other,
        };

        Ok(StepOutput::new(payload, self.name.clone(), start.elapsed()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_executor_builder() {
        let executor = HttpExecutor::new("inventory", "http://localhost:7000/inventory")
            .unwrap()
            .with_api_key("sk-test")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(executor.name, "inventory");
        assert_eq!(executor.api_key, Some("sk-test".into()));
        assert_eq!(executor.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_config_requires_url() {
        let err = HttpExecutor::from_config("inventory", &AgentConfig::default()).unwrap_err();
        assert!(matches!(err, ExecutorError::Config { .. }));

        let config = AgentConfig {
            url: Some("http://localhost:7000/inventory".into()),
            timeout: 12,
            ..Default::default()
        };
        let executor = HttpExecutor::from_config("inventory", &config).unwrap();
        assert_eq!(executor.timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_map_http_error() {
        let timeout = Duration::from_secs(10);
        let err = map_http_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, "down", timeout);
        assert!(matches!(err, ExecutorError::Http { status: 503, .. }));
        assert!(err.is_retryable());

        let err = map_http_error(reqwest::StatusCode::GATEWAY_TIMEOUT, "", timeout);
        assert!(matches!(err, ExecutorError::Timeout { .. }));

        let err = map_http_error(reqwest::StatusCode::UNPROCESSABLE_ENTITY, "bad sku", timeout);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Port 9 (discard) is not expected to be listening
        let executor = HttpExecutor::new("nobody", "http://127.0.0.1:9/agent")
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        let request = crate::executor::fixed::tests::request("inventory");

        let err = executor.execute(&request).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
