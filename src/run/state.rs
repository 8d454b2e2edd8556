//! Per-run state: step instances, cursor and lifecycle

use super::error::FlowError;
use crate::step::{StepSpec, WorkflowDefinition};
use crate::template::TemplateContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Status of a single step within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Active,
    Complete,
    Rejected,
}

/// Per-run materialization of a step spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInstance {
    pub id: String,
    pub label: String,
    pub agent: Option<String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl StepInstance {
    fn from_spec(spec: &StepSpec) -> Self {
        Self {
            id: spec.id.clone(),
            label: spec.label.clone(),
            agent: spec.agent.clone(),
            status: StepStatus::Pending,
            result: None,
        }
    }
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Running,
    Suspended,
    Done,
    Rejected,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Rejected | RunState::Failed)
    }
}

/// One execution of a workflow definition
///
/// All mutation goes through the transition methods, which refuse moves
/// the lifecycle does not allow. The cursor only ever increases and
/// `final_result` is written exactly once, on entering a terminal state.
#[derive(Debug, Clone)]
pub struct Run {
    pub run_id: String,
    pub definition: Arc<WorkflowDefinition>,
    pub input: serde_json::Value,
    pub prior_turns: Vec<serde_json::Value>,

    /// Specialist spliced in at start (supervisor workflows)
    pub route: Option<String>,

    pub created_at: DateTime<Utc>,

    specs: Vec<StepSpec>,
    steps: Vec<StepInstance>,
    cursor: usize,
    state: RunState,
    final_result: Option<String>,
}

impl Run {
    /// Create a run over an already-materialized step chain
    pub fn new(
        run_id: impl Into<String>,
        definition: Arc<WorkflowDefinition>,
        specs: Vec<StepSpec>,
        input: serde_json::Value,
        prior_turns: Vec<serde_json::Value>,
        route: Option<String>,
    ) -> Self {
        let steps = specs.iter().map(StepInstance::from_spec).collect();
        Self {
            run_id: run_id.into(),
            definition,
            input,
            prior_turns,
            route,
            created_at: Utc::now(),
            specs,
            steps,
            cursor: 0,
            state: RunState::Created,
            final_result: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn final_result(&self) -> Option<&str> {
        self.final_result.as_deref()
    }

    /// Full ordered list of step instances
    pub fn snapshot(&self) -> Vec<StepInstance> {
        self.steps.clone()
    }

    pub fn step(&self, index: usize) -> Option<&StepInstance> {
        self.steps.get(index)
    }

    /// Spec of the step at the cursor
    pub fn current_spec(&self) -> Option<&StepSpec> {
        self.specs.get(self.cursor)
    }

    /// Step instance at the cursor
    pub fn current_step(&self) -> Option<&StepInstance> {
        self.steps.get(self.cursor)
    }

    /// Whether the cursor has passed the last step
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// Results of finished steps keyed by step id
    pub fn prior_results(&self) -> BTreeMap<String, serde_json::Value> {
        self.steps
            .iter()
            .filter_map(|s| s.result.as_ref().map(|r| (s.id.clone(), r.clone())))
            .collect()
    }

    /// Template context over this run's input and results
    pub fn template_context(&self) -> TemplateContext {
        let mut ctx = TemplateContext::with_input(self.input.clone());
        ctx.steps = self.prior_results();
        ctx.set_run_id(self.run_id.clone());
        ctx.set_workflow(self.definition.name.clone());
        if let Some(ref route) = self.route {
            ctx.set_route(route.clone());
        }
        ctx
    }

    /// created -> running
    pub fn begin(&mut self) -> Result<(), FlowError> {
        self.expect_state(RunState::Created, "begin")?;
        self.state = RunState::Running;
        Ok(())
    }

    /// Mark the step at the cursor active
    pub fn activate_current(&mut self) -> Result<&StepInstance, FlowError> {
        self.expect_state(RunState::Running, "activate step")?;
        let cursor = self.cursor;
        let step = self.step_mut(cursor, StepStatus::Pending, "activate")?;
        step.status = StepStatus::Active;
        Ok(&self.steps[cursor])
    }

    /// Mark the active step complete and advance the cursor
    pub fn complete_current(
        &mut self,
        result: serde_json::Value,
    ) -> Result<&StepInstance, FlowError> {
        self.expect_state(RunState::Running, "complete step")?;
        let cursor = self.cursor;
        let step = self.step_mut(cursor, StepStatus::Active, "complete")?;
        step.status = StepStatus::Complete;
        step.result = Some(result);
        self.cursor += 1;
        Ok(&self.steps[cursor])
    }

    /// running -> suspended at an active checkpoint
    pub fn suspend(&mut self) -> Result<(), FlowError> {
        self.expect_state(RunState::Running, "suspend")?;
        let is_checkpoint = self.current_spec().is_some_and(|s| s.is_checkpoint);
        let is_active = self
            .current_step()
            .is_some_and(|s| s.status == StepStatus::Active);
        if !is_checkpoint || !is_active {
            return Err(FlowError::invalid_transition(format!(
                "run {} can only suspend on an active checkpoint",
                self.run_id
            )));
        }
        self.state = RunState::Suspended;
        Ok(())
    }

    /// suspended -> running, keeping the checkpoint active
    pub fn resume(&mut self) -> Result<(), FlowError> {
        self.expect_state(RunState::Suspended, "resume")?;
        self.state = RunState::Running;
        Ok(())
    }

    /// Mark the active checkpoint rejected and terminate the run
    pub fn reject_current(
        &mut self,
        result: serde_json::Value,
        message: impl Into<String>,
    ) -> Result<&StepInstance, FlowError> {
        self.expect_state(RunState::Running, "reject step")?;
        let cursor = self.cursor;
        let step = self.step_mut(cursor, StepStatus::Active, "reject")?;
        step.status = StepStatus::Rejected;
        step.result = Some(result);
        self.set_final_result(message.into())?;
        self.state = RunState::Rejected;
        Ok(&self.steps[cursor])
    }

    /// running -> done once every step has completed
    pub fn finish(&mut self, result: impl Into<String>) -> Result<(), FlowError> {
        self.expect_state(RunState::Running, "finish")?;
        if !self.is_exhausted() {
            return Err(FlowError::invalid_transition(format!(
                "run {} finished with {} steps remaining",
                self.run_id,
                self.steps.len() - self.cursor
            )));
        }
        self.set_final_result(result.into())?;
        self.state = RunState::Done;
        Ok(())
    }

    /// Move any non-terminal run to failed with an error payload
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), FlowError> {
        if self.state.is_terminal() {
            return Err(FlowError::invalid_transition(format!(
                "run {} is already {:?}",
                self.run_id, self.state
            )));
        }
        self.set_final_result(error.into())?;
        self.state = RunState::Failed;
        Ok(())
    }

    fn set_final_result(&mut self, result: String) -> Result<(), FlowError> {
        if self.final_result.is_some() {
            return Err(FlowError::invalid_transition(format!(
                "run {} already has a final result",
                self.run_id
            )));
        }
        self.final_result = Some(result);
        Ok(())
    }

    fn expect_state(&self, expected: RunState, action: &str) -> Result<(), FlowError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FlowError::invalid_transition(format!(
                "cannot {} run {} in state {:?}",
                action, self.run_id, self.state
            )))
        }
    }

    fn step_mut(
        &mut self,
        index: usize,
        expected: StepStatus,
        action: &str,
    ) -> Result<&mut StepInstance, FlowError> {
        let run_id = self.run_id.clone();
        let step = self.steps.get_mut(index).ok_or_else(|| {
            FlowError::invalid_transition(format!(
                "cannot {} past the last step of run {}",
                action, run_id
            ))
        })?;
        if step.status != expected {
            return Err(FlowError::invalid_transition(format!(
                "cannot {} step '{}' in status {:?}",
                action, step.id, step.status
            )));
        }
        Ok(step)
    }
}
