//! Deterministic in-process executors

use super::types::{ExecutorError, StepExecutor, StepOutput, StepRequest};
use crate::template::{TemplateContext, TemplateEngine};
use async_trait::async_trait;
use std::time::Instant;

/// Build the template context a step payload renders against
pub fn request_context(request: &StepRequest) -> TemplateContext {
    let mut ctx = TemplateContext::with_input(request.input.clone());
    ctx.steps = request.prior_results.clone();
    ctx.set_run_id(request.run_id.clone());
    ctx.set_workflow(request.workflow.clone());
    if let Some(ref route) = request.route {
        ctx.set_route(route.clone());
    }
    ctx
}

/// Returns a fixed payload with every string leaf rendered as a template
#[derive(Debug, Clone)]
pub struct StaticExecutor {
    name: String,
    payload: serde_json::Value,
    templates: TemplateEngine,
}

impl StaticExecutor {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            templates: TemplateEngine::new(),
        }
    }
}

#[async_trait]
impl StepExecutor for StaticExecutor {
    async fn execute(&self, request: &StepRequest) -> Result<StepOutput, ExecutorError> {
        let start = Instant::now();
        let ctx = request_context(request);
        let payload = self
            .templates
            .render_value(&self.payload, &ctx)
            .map_err(|e| ExecutorError::failed(format!("rendering output: {}", e)))?;
        Ok(StepOutput::new(payload, self.name.clone(), start.elapsed()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Returns `{ step, input }`; the default when nothing is bound
#[derive(Debug, Clone, Default)]
pub struct EchoExecutor;

#[async_trait]
impl StepExecutor for EchoExecutor {
    async fn execute(&self, request: &StepRequest) -> Result<StepOutput, ExecutorError> {
        let payload = serde_json::json!({
            "step": request.step.id,
            "input": request.input,
        });
        Ok(StepOutput::new(payload, "echo", Default::default()))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
