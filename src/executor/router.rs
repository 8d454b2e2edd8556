//! Routers that pick the specialist for supervisor workflows

use super::http::{map_http_error, map_send_error};
use super::types::ExecutorError;
use crate::config::{RouterConfig, RouterKind};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised while routing
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    #[error("no route matched and no default is configured")]
    NoMatch,

    #[error("invalid route pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("router misconfigured: {message}")]
    Config { message: String },

    #[error("remote router failed: {0}")]
    Remote(#[from] ExecutorError),
}

/// Input the router decides on
#[derive(Debug, Clone, Serialize)]
pub struct RouteRequest {
    pub workflow: String,
    pub input: serde_json::Value,
    pub prior_turns: Vec<serde_json::Value>,
}

impl RouteRequest {
    /// Text to match against: `input.message` when present, else the JSON input
    pub fn text(&self) -> String {
        match self.input.get("message").and_then(|m| m.as_str()) {
            Some(message) => message.to_string(),
            None => self.input.to_string(),
        }
    }
}

/// Picks a specialist id for a run
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, request: &RouteRequest) -> Result<String, RouterError>;

    fn name(&self) -> &str;
}

/// Build the router a workflow declares
pub fn build_router(config: &RouterConfig) -> Result<Arc<dyn Router>, RouterError> {
    match config.kind {
        RouterKind::Keyword => Ok(Arc::new(KeywordRouter::from_config(config)?)),
        RouterKind::Http => Ok(Arc::new(HttpRouter::from_config(config)?)),
    }
}

/// Ordered regex rules, first match wins
#[derive(Debug, Clone)]
pub struct KeywordRouter {
    rules: Vec<(Regex, String)>,
    default: Option<String>,
}

impl KeywordRouter {
    pub fn from_config(config: &RouterConfig) -> Result<Self, RouterError> {
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.specialist.clone()))
                    .map_err(|e| RouterError::InvalidPattern {
                        pattern: rule.pattern.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            default: config.default.clone(),
        })
    }
}

#[async_trait]
impl Router for KeywordRouter {
    async fn route(&self, request: &RouteRequest) -> Result<String, RouterError> {
        let text = request.text();
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(&text))
            .map(|(_, specialist)| specialist.clone())
            .or_else(|| self.default.clone())
            .ok_or(RouterError::NoMatch)
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Remote router answering `{ "specialist": "<id>" }`
#[derive(Debug, Clone)]
pub struct HttpRouter {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    specialist: String,
}

impl HttpRouter {
    pub fn from_config(config: &RouterConfig) -> Result<Self, RouterError> {
        let url = config.url.clone().ok_or_else(|| RouterError::Config {
            message: "http router missing 'url'".into(),
        })?;
        let client = reqwest::Client::builder().build().map_err(|e| RouterError::Config {
            message: format!("failed to build HTTP client: {}", e),
        })?;

        Ok(Self {
            url,
            timeout: Duration::from_secs(config.timeout),
            client,
        })
    }
}

#[async_trait]
impl Router for HttpRouter {
    async fn route(&self, request: &RouteRequest) -> Result<String, RouterError> {
        let start = Instant::now();
        let send = self.client.post(&self.url).json(request).send();

        let response = match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(map_send_error(e, start.elapsed()).into()),
            Err(_) => return Err(ExecutorError::timeout(start.elapsed()).into()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body, self.timeout).into());
        }

        let decision: RouteResponse = response
            .json()
            .await
            .map_err(|e| ExecutorError::parse(format!("invalid routing response: {}", e)))?;
        Ok(decision.specialist)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteRule;
    use serde_json::json;

    fn dealer_router() -> KeywordRouter {
        KeywordRouter::from_config(&RouterConfig {
            default: Some("inquiry".into()),
            rules: vec![
                RouteRule {
                    pattern: r"(?i)\$?\d{2,6}|\b(show|find|under)\b".into(),
                    specialist: "inventory".into(),
                },
                RouteRule {
                    pattern: r"(?i)financ|loan|monthly".into(),
                    specialist: "finance".into(),
                },
            ],
            ..Default::default()
        })
        .unwrap()
    }

    fn ask(message: &str) -> RouteRequest {
        RouteRequest {
            workflow: "automotive_sales".into(),
            input: json!({ "message": message }),
            prior_turns: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_first_rule_wins() {
        let router = dealer_router();
        assert_eq!(router.route(&ask("What financing do you offer?")).await.unwrap(), "finance");
        assert_eq!(router.route(&ask("Show me a loan under 30000")).await.unwrap(), "inventory");
    }

    #[tokio::test]
    async fn test_default_fallback() {
        let router = dealer_router();
        assert_eq!(router.route(&ask("When are you open?")).await.unwrap(), "inquiry");
    }

    #[tokio::test]
    async fn test_no_match_without_default() {
        let router = KeywordRouter::from_config(&RouterConfig {
            rules: vec![RouteRule {
                pattern: "brake".into(),
                specialist: "service".into(),
            }],
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(router.route(&ask("hello")).await, Err(RouterError::NoMatch)));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = KeywordRouter::from_config(&RouterConfig {
            rules: vec![RouteRule {
                pattern: "([".into(),
                specialist: "service".into(),
            }],
            ..Default::default()
        });
        assert!(matches!(result, Err(RouterError::InvalidPattern { .. })));
    }

    #[test]
    fn test_route_text_falls_back_to_json() {
        let request = RouteRequest {
            workflow: "w".into(),
            input: json!({ "vin": "1HGCM82633A004352" }),
            prior_turns: Vec::new(),
        };
        assert!(request.text().contains("1HGCM82633A004352"));
    }

    #[test]
    fn test_http_router_requires_url() {
        let config = RouterConfig {
            kind: RouterKind::Http,
            ..Default::default()
        };
        assert!(matches!(build_router(&config), Err(RouterError::Config { .. })));
    }
}
