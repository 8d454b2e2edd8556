//! Workflow listing

use crate::config::{Topology, WorkflowSource};
use crate::coordinator::RunCoordinator;
use crate::step::StepSpec;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

pub fn router() -> Router<RunCoordinator> {
    Router::new().route("/", get(list_workflows))
}

#[derive(Debug, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub topology: Topology,
    pub source: WorkflowSource,
    pub steps: Vec<StepSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub specialists: Vec<StepSpec>,
}

/// GET /api/workflows
async fn list_workflows(State(coordinator): State<RunCoordinator>) -> Json<Vec<WorkflowSummary>> {
    let workflows = coordinator
        .context()
        .catalog
        .list()
        .map(|(definition, source)| WorkflowSummary {
            name: definition.name.clone(),
            description: definition.description.clone(),
            topology: definition.topology,
            source,
            steps: definition.steps.clone(),
            specialists: definition.specialists.clone(),
        })
        .collect();
    Json(workflows)
}
