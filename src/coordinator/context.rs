//! Services injected into the coordinator at construction

use crate::config::FlowgateConfig;
use crate::executor::{AgentPool, Router, RouterError, build_router};
use crate::step::DefinitionCatalog;
use crate::template::TemplateEngine;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Everything a run needs from outside itself
///
/// Built once and shared read-only by every run.
pub struct FlowContext {
    pub catalog: DefinitionCatalog,
    pub agents: AgentPool,
    pub templates: TemplateEngine,
    pub config: FlowgateConfig,
    routers: HashMap<String, Arc<dyn Router>>,
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("workflows", &self.catalog.len())
            .field("agents", &self.agents)
            .field("routers", &self.routers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FlowContext {
    /// Assemble a context, building the router of every supervisor workflow
    pub fn new(
        catalog: DefinitionCatalog,
        agents: AgentPool,
        config: FlowgateConfig,
    ) -> Result<Self, RouterError> {
        let mut routers = HashMap::new();
        for (definition, _) in catalog.list() {
            if let Some(ref router) = definition.router {
                routers.insert(definition.name.clone(), build_router(router)?);
            }

            let missing = agents.missing_agents(definition);
            if !missing.is_empty() {
                tracing::warn!(
                    workflow = %definition.name,
                    agents = ?missing,
                    "Workflow references agents that are not configured"
                );
            }
        }

        Ok(Self {
            catalog,
            agents,
            templates: TemplateEngine::new(),
            config,
            routers,
        })
    }

    /// Load configuration, workflows and agents for a project
    pub fn load(project_dir: Option<&Path>, explicit_config: Option<&Path>) -> Result<Self> {
        let config = FlowgateConfig::load(project_dir, explicit_config)?;
        let catalog = DefinitionCatalog::load(project_dir)?;
        let agents = AgentPool::from_config(&config).context("Failed to build agents")?;
        Self::new(catalog, agents, config).context("Failed to build workflow routers")
    }

    /// Replace the router used for a workflow
    pub fn with_router(mut self, workflow: impl Into<String>, router: Arc<dyn Router>) -> Self {
        self.routers.insert(workflow.into(), router);
        self
    }

    pub fn router_for(&self, workflow: &str) -> Option<Arc<dyn Router>> {
        self.routers.get(workflow).cloned()
    }
}
