//! Immutable workflow definitions and their step specs

use crate::config::{ApprovalConfig, RouterConfig, StepConfig, Topology, WorkflowConfig};
use crate::run::FlowError;
use serde::Serialize;

/// What performs a non-checkpoint step
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorBinding {
    /// Named agent from the `[agents]` table
    Agent(String),
    /// Inline payload rendered as templates
    Static(serde_json::Value),
    /// Echo the request back
    Echo,
}

/// One step of a workflow definition
#[derive(Debug, Clone, Serialize)]
pub struct StepSpec {
    pub id: String,
    pub label: String,
    pub agent: Option<String>,
    pub is_checkpoint: bool,

    #[serde(skip)]
    pub checkpoint_if: Option<String>,

    #[serde(skip)]
    pub approval: Option<ApprovalConfig>,

    #[serde(skip)]
    pub binding: ExecutorBinding,

    /// Placeholder replaced by the routed specialist
    #[serde(skip)]
    pub dispatch: bool,
}

impl StepSpec {
    fn from_config(config: &StepConfig) -> Self {
        let binding = match (&config.executor, &config.output) {
            (Some(agent), _) => ExecutorBinding::Agent(agent.clone()),
            (None, Some(output)) => ExecutorBinding::Static(output.clone()),
            (None, None) => ExecutorBinding::Echo,
        };

        Self {
            id: config.id.clone(),
            label: config.label.clone(),
            agent: config.agent.clone(),
            is_checkpoint: config.checkpoint,
            checkpoint_if: config.checkpoint_if.clone(),
            approval: config.approval.clone(),
            binding,
            dispatch: config.dispatch,
        }
    }
}

/// A workflow type: ordered steps plus, for supervisor workflows,
/// the specialist allow-list and the router that picks one
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub topology: Topology,
    pub steps: Vec<StepSpec>,
    pub specialists: Vec<StepSpec>,

    #[serde(skip)]
    pub router: Option<RouterConfig>,

    #[serde(skip)]
    pub result_template: Option<String>,

    #[serde(skip)]
    pub rejection_template: Option<String>,
}

impl WorkflowDefinition {
    /// Build a definition from validated configuration
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            topology: config.topology,
            steps: config.steps.iter().map(StepSpec::from_config).collect(),
            specialists: config.specialists.iter().map(StepSpec::from_config).collect(),
            router: config.router.clone(),
            result_template: config.result_template.clone(),
            rejection_template: config.rejection_template.clone(),
        }
    }

    pub fn is_supervisor(&self) -> bool {
        self.topology == Topology::Supervisor
    }

    /// Ids a router may select
    pub fn specialist_ids(&self) -> Vec<&str> {
        self.specialists.iter().map(|s| s.id.as_str()).collect()
    }

    /// Resolve the concrete step chain for one run
    ///
    /// Supervisor workflows splice the routed specialist into the dispatch
    /// slot; the id must come from the allow-list. Linear workflows ignore
    /// the routing decision.
    pub fn materialize(&self, specialist: Option<&str>) -> Result<Vec<StepSpec>, FlowError> {
        if !self.is_supervisor() {
            return Ok(self.steps.clone());
        }

        let specialist = specialist.ok_or_else(|| {
            FlowError::routing(format!("workflow '{}' needs a routing decision", self.name))
        })?;

        let chosen = self
            .specialists
            .iter()
            .find(|s| s.id == specialist)
            .ok_or_else(|| FlowError::UnknownSpecialist {
                workflow: self.name.clone(),
                specialist: specialist.to_string(),
            })?;

        Ok(self
            .steps
            .iter()
            .map(|step| {
                if step.dispatch {
                    chosen.clone()
                } else {
                    step.clone()
                }
            })
            .collect())
    }
}
