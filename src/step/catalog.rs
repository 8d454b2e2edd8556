//! Lookup of workflow definitions by type

use super::definition::WorkflowDefinition;
use crate::config::{self, WorkflowConfig, WorkflowSource};
use crate::run::FlowError;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Definitions loaded once and shared by every run of their type
#[derive(Debug, Clone, Default)]
pub struct DefinitionCatalog {
    definitions: BTreeMap<String, (Arc<WorkflowDefinition>, WorkflowSource)>,
}

impl DefinitionCatalog {
    /// Load built-in, user and project workflows
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut catalog = Self::default();
        for (name, (workflow, source)) in config::load_all_workflows(project_dir)? {
            catalog.definitions.insert(
                name,
                (Arc::new(WorkflowDefinition::from_config(&workflow)), source),
            );
        }
        tracing::debug!(count = catalog.definitions.len(), "Loaded workflow definitions");
        Ok(catalog)
    }

    /// Register a definition directly, validating it first
    pub fn insert(&mut self, workflow: &WorkflowConfig) -> Result<()> {
        workflow.validate().map_err(|errors| {
            anyhow::anyhow!("workflow validation failed:\n  {}", errors.join("\n  "))
        })?;
        self.definitions.insert(
            workflow.name.clone(),
            (
                Arc::new(WorkflowDefinition::from_config(workflow)),
                WorkflowSource::Project,
            ),
        );
        Ok(())
    }

    /// Look up the definition for a workflow type
    pub fn get_definition(
        &self,
        workflow_type: &str,
    ) -> Result<Arc<WorkflowDefinition>, FlowError> {
        self.definitions
            .get(workflow_type)
            .map(|(definition, _)| Arc::clone(definition))
            .ok_or_else(|| FlowError::workflow_not_found(workflow_type))
    }

    /// All definitions in name order, with where each came from
    pub fn list(&self) -> impl Iterator<Item = (&Arc<WorkflowDefinition>, WorkflowSource)> {
        self.definitions
            .values()
            .map(|(definition, source)| (definition, *source))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
