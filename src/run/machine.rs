//! Driving a run through its steps
//!
//! The driver owns no state of its own: it advances a borrowed [`Run`],
//! calling executors and emitting one `step` event per status change. It
//! stops at the first checkpoint that needs a decision or at a terminal
//! state. Minting approval tokens is left to the caller.

use super::error::FlowError;
use super::state::{Run, RunState};
use crate::config::ApprovalConfig;
use crate::events::{EventSink, FlowEvent};
use crate::executor::{AgentPool, StepRequest};
use crate::step::StepSpec;
use crate::template::{TemplateContext, TemplateEngine, should_suspend};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Instant;

/// Human decision on a suspended checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn from_approved(approved: bool) -> Self {
        if approved {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }

    /// Result recorded on the checkpoint step
    fn step_result(&self) -> serde_json::Value {
        match self {
            Decision::Approve => json!({ "decision": "approved" }),
            Decision::Reject => json!({ "decision": "rejected" }),
        }
    }
}

/// Rendered prompt shown while a run waits on a checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalPrompt {
    pub title: String,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

/// Where a drive left the run
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Waiting on a decision for the active checkpoint
    Suspended(ApprovalPrompt),
    /// Every step completed; carries the final result
    Done(String),
    /// A checkpoint was rejected; carries the rejection message
    Rejected(String),
    /// A step or template failed; carries the error
    Failed(String),
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Suspended(_))
    }
}

/// Advances runs, one borrow at a time
pub struct RunDriver<'a> {
    agents: &'a AgentPool,
    templates: &'a TemplateEngine,
    sink: &'a dyn EventSink,
}

impl<'a> RunDriver<'a> {
    pub fn new(
        agents: &'a AgentPool,
        templates: &'a TemplateEngine,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            agents,
            templates,
            sink,
        }
    }

    /// Drive a freshly created run until it suspends or terminates
    pub async fn start(&self, run: &mut Run) -> Outcome {
        tracing::info!(
            run_id = %run.run_id,
            workflow = %run.definition.name,
            steps = run.snapshot().len(),
            "Starting run"
        );

        let result = match run.begin() {
            Ok(()) => self.advance(run).await,
            Err(e) => Err(e),
        };
        self.settle(run, result).await
    }

    /// Apply a decision to a suspended run and drive it onward
    ///
    /// The run must be suspended on an active checkpoint; callers check the
    /// approval token against the run before getting here.
    pub async fn resume(&self, run: &mut Run, decision: Decision) -> Outcome {
        let result = self.apply_decision(run, decision).await;
        self.settle(run, result).await
    }

    async fn apply_decision(
        &self,
        run: &mut Run,
        decision: Decision,
    ) -> Result<Outcome, FlowError> {
        run.resume()?;

        let step_id = run
            .current_step()
            .map(|s| s.id.clone())
            .unwrap_or_default();
        tracing::info!(run_id = %run.run_id, step = %step_id, ?decision, "Decision received");

        match decision {
            Decision::Approve => {
                run.complete_current(decision.step_result())?;
                self.emit_step(run, run.cursor() - 1).await;
                self.advance(run).await
            }
            Decision::Reject => {
                let message = self.rejection_message(run, &step_id, decision.step_result())?;
                run.reject_current(decision.step_result(), message.clone())?;
                self.emit_step(run, run.cursor()).await;
                Ok(Outcome::Rejected(message))
            }
        }
    }

    /// Run steps from the cursor until a checkpoint suspends or the chain ends
    async fn advance(&self, run: &mut Run) -> Result<Outcome, FlowError> {
        loop {
            let Some(spec) = run.current_spec().cloned() else {
                let result = self.final_result(run)?;
                run.finish(result.clone())?;
                return Ok(Outcome::Done(result));
            };

            run.activate_current()?;
            self.emit_step(run, run.cursor()).await;

            if spec.is_checkpoint {
                let ctx = run.template_context();
                let suspend =
                    should_suspend(spec.checkpoint_if.as_deref(), &ctx).map_err(|e| {
                        let origin = format!("checkpoint_if of '{}'", spec.id);
                        FlowError::template(origin, e.to_string())
                    })?;

                if !suspend {
                    tracing::info!(
                        run_id = %run.run_id,
                        step = %spec.id,
                        "Checkpoint condition false, skipping"
                    );
                    run.complete_current(json!({ "decision": "skipped" }))?;
                    self.emit_step(run, run.cursor() - 1).await;
                    continue;
                }

                let prompt = self.render_prompt(&spec, &ctx)?;
                run.suspend()?;
                tracing::info!(run_id = %run.run_id, step = %spec.id, "Run suspended for approval");
                return Ok(Outcome::Suspended(prompt));
            }

            let payload = self.execute(run, &spec).await?;
            run.complete_current(payload)?;
            self.emit_step(run, run.cursor() - 1).await;
        }
    }

    async fn execute(&self, run: &Run, spec: &StepSpec) -> Result<serde_json::Value, FlowError> {
        let executor = self
            .agents
            .resolve(spec)
            .map_err(|e| FlowError::step_execution(&spec.id, e.to_string()))?;

        let request = StepRequest {
            run_id: run.run_id.clone(),
            workflow: run.definition.name.clone(),
            step: spec.clone(),
            input: run.input.clone(),
            prior_turns: run.prior_turns.clone(),
            prior_results: run.prior_results(),
            route: run.route.clone(),
        };

        let start = Instant::now();
        match executor.execute(&request).await {
            Ok(output) => {
                tracing::debug!(
                    run_id = %run.run_id,
                    step = %spec.id,
                    executor = %output.executor,
                    duration_ms = output.duration.as_millis() as u64,
                    "Step completed"
                );
                Ok(output.payload)
            }
            Err(e) => {
                tracing::warn!(
                    run_id = %run.run_id,
                    step = %spec.id,
                    executor = executor.name(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "Step failed"
                );
                Err(FlowError::step_execution(&spec.id, e.to_string()))
            }
        }
    }

    /// Turn a drive result into the stream's terminal event
    ///
    /// Suspension is reported by the caller, which owns the token.
    async fn settle(&self, run: &mut Run, result: Result<Outcome, FlowError>) -> Outcome {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let content = e.to_string();
                if let Err(fail_err) = run.fail(content.clone()) {
                    tracing::error!(
                        run_id = %run.run_id,
                        error = %fail_err,
                        "Could not mark run failed"
                    );
                }
                tracing::error!(run_id = %run.run_id, error = %content, "Run failed");
                Outcome::Failed(content)
            }
        };

        match outcome {
            Outcome::Done(ref content) | Outcome::Rejected(ref content) => {
                tracing::info!(run_id = %run.run_id, state = ?run.state(), "Run finished");
                self.sink
                    .emit(FlowEvent::Response {
                        run_id: run.run_id.clone(),
                        content: content.clone(),
                    })
                    .await;
            }
            Outcome::Failed(ref content) => {
                self.sink
                    .emit(FlowEvent::Error {
                        run_id: Some(run.run_id.clone()),
                        content: content.clone(),
                    })
                    .await;
            }
            Outcome::Suspended(_) => debug_assert_eq!(run.state(), RunState::Suspended),
        }
        outcome
    }

    async fn emit_step(&self, run: &Run, index: usize) {
        if let Some(step) = run.step(index) {
            self.sink
                .emit(FlowEvent::Step {
                    run_id: run.run_id.clone(),
                    step: step.clone(),
                    all_steps: run.snapshot(),
                })
                .await;
        }
    }

    fn render_prompt(
        &self,
        spec: &StepSpec,
        ctx: &TemplateContext,
    ) -> Result<ApprovalPrompt, FlowError> {
        let Some(ref approval) = spec.approval else {
            return Ok(ApprovalPrompt {
                title: ApprovalConfig::default().title,
                message: format!("{} is waiting for your decision.", spec.label),
                details: BTreeMap::new(),
            });
        };

        let origin = format!("approval prompt of '{}'", spec.id);
        let render = |template: &str| {
            self.templates
                .render_trimmed(template, ctx)
                .map_err(|e| FlowError::template(&origin, e.to_string()))
        };

        let mut details = BTreeMap::new();
        for (key, template) in &approval.details {
            details.insert(key.clone(), render(template)?);
        }

        Ok(ApprovalPrompt {
            title: render(&approval.title)?,
            message: render(&approval.message)?,
            details,
        })
    }

    fn final_result(&self, run: &Run) -> Result<String, FlowError> {
        if let Some(ref template) = run.definition.result_template {
            return self
                .templates
                .render_trimmed(template, &run.template_context())
                .map_err(|e| FlowError::template("result_template", e.to_string()));
        }

        let last = run.snapshot().into_iter().rev().find_map(|s| s.result);
        Ok(match last {
            Some(value) => summarize(&value),
            None => format!("Workflow '{}' complete.", run.definition.name),
        })
    }

    fn rejection_message(
        &self,
        run: &Run,
        step_id: &str,
        result: serde_json::Value,
    ) -> Result<String, FlowError> {
        let label = run
            .current_step()
            .map(|s| s.label.clone())
            .unwrap_or_else(|| step_id.to_string());

        match run.definition.rejection_template {
            Some(ref template) => {
                let mut ctx = run.template_context();
                ctx.add_step(step_id, result);
                self.templates
                    .render_trimmed(template, &ctx)
                    .map_err(|e| FlowError::template("rejection_template", e.to_string()))
            }
            None => Ok(format!(
                "Workflow '{}' was rejected at '{}'. No further steps were run.",
                run.definition.name, label
            )),
        }
    }
}

/// Text form of a step result: a `content`/`summary` field, a plain
/// string, or the JSON itself
fn summarize(value: &serde_json::Value) -> String {
    if let Some(s) = value.as_str() {
        return s.to_string();
    }
    ["content", "summary"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}
