//! Resolution of step bindings to executors

use super::fixed::{EchoExecutor, StaticExecutor};
use super::http::HttpExecutor;
use super::retry::RetryExecutor;
use super::types::{ExecutorError, RetryPolicy, StepExecutor};
use crate::config::{AgentKind, FlowgateConfig};
use crate::step::{ExecutorBinding, StepSpec, WorkflowDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Named step executors built from `[agents]`
#[derive(Clone)]
pub struct AgentPool {
    agents: HashMap<String, Arc<dyn StepExecutor>>,
    step_overrides: HashMap<String, Arc<dyn StepExecutor>>,
    echo: Arc<dyn StepExecutor>,
}

impl Default for AgentPool {
    fn default() -> Self {
        Self {
            agents: HashMap::new(),
            step_overrides: HashMap::new(),
            echo: Arc::new(EchoExecutor),
        }
    }
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .field("step_overrides", &self.step_overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AgentPool {
    /// Build executors for every enabled agent
    pub fn from_config(config: &FlowgateConfig) -> Result<Self, ExecutorError> {
        let mut pool = Self::default();

        for (name, agent) in &config.agents {
            if !agent.enabled {
                tracing::debug!(agent = %name, "Skipping disabled agent");
                continue;
            }

            let executor: Arc<dyn StepExecutor> = match agent.kind() {
                AgentKind::Http => Arc::new(HttpExecutor::from_config(name.clone(), agent)?),
                AgentKind::Static => Arc::new(StaticExecutor::new(
                    name.clone(),
                    agent.output.clone().unwrap_or_default(),
                )),
                AgentKind::Echo => Arc::new(EchoExecutor),
            };

            let executor: Arc<dyn StepExecutor> = if agent.max_retries > 0 {
                Arc::new(RetryExecutor::new(executor, RetryPolicy::from_config(agent)))
            } else {
                executor
            };

            tracing::debug!(agent = %name, kind = ?agent.kind(), "Registered agent");
            pool.agents.insert(name.clone(), executor);
        }

        Ok(pool)
    }

    /// Register an executor under an agent name
    pub fn with_executor(
        mut self,
        name: impl Into<String>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        self.agents.insert(name.into(), executor);
        self
    }

    /// Force a specific executor for a step id, whatever its binding
    pub fn with_step_executor(
        mut self,
        step_id: impl Into<String>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        self.step_overrides.insert(step_id.into(), executor);
        self
    }

    /// Resolve the executor for a step
    pub fn resolve(&self, step: &StepSpec) -> Result<Arc<dyn StepExecutor>, ExecutorError> {
        if let Some(executor) = self.step_overrides.get(&step.id) {
            return Ok(Arc::clone(executor));
        }

        match step.binding {
            ExecutorBinding::Agent(ref name) => self.agents.get(name).cloned().ok_or_else(|| {
                ExecutorError::config(format!("agent '{}' is not configured or disabled", name))
            }),
            ExecutorBinding::Static(ref payload) => {
                Ok(Arc::new(StaticExecutor::new(step.id.clone(), payload.clone())))
            }
            ExecutorBinding::Echo => Ok(Arc::clone(&self.echo)),
        }
    }

    /// Agent names a definition references that the pool cannot provide
    pub fn missing_agents(&self, definition: &WorkflowDefinition) -> Vec<String> {
        let mut missing: Vec<String> = definition
            .steps
            .iter()
            .chain(definition.specialists.iter())
            .filter_map(|step| match step.binding {
                ExecutorBinding::Agent(ref name) if !self.agents.contains_key(name) => {
                    Some(name.clone())
                }
                _ => None,
            })
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, StepConfig, WorkflowConfig};
    use crate::executor::fixed::tests::request;
    use serde_json::json;

    fn spec(binding: ExecutorBinding) -> StepSpec {
        let mut step = request("inventory").step;
        step.binding = binding;
        step
    }

    #[tokio::test]
    async fn test_resolve_bindings() {
        let mut config = FlowgateConfig::default();
        config.agents.insert(
            "inventory".into(),
            AgentConfig {
                output: Some(json!({ "warehouses": ["Central DC"] })),
                ..Default::default()
            },
        );
        let pool = AgentPool::from_config(&config).unwrap();

        let executor = pool.resolve(&spec(ExecutorBinding::Agent("inventory".into()))).unwrap();
        let output = executor.execute(&request("inventory")).await.unwrap();
        assert_eq!(output.payload["warehouses"][0], "Central DC");

        let executor = pool.resolve(&spec(ExecutorBinding::Echo)).unwrap();
        assert_eq!(executor.name(), "echo");

        let executor = pool.resolve(&spec(ExecutorBinding::Static(json!(1)))).unwrap();
        assert_eq!(executor.name(), "inventory");
    }

    #[test]
    fn test_disabled_agent_is_missing() {
        let mut config = FlowgateConfig::default();
        config.agents.insert(
            "shipping".into(),
            AgentConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let pool = AgentPool::from_config(&config).unwrap();

        let err = pool
            .resolve(&spec(ExecutorBinding::Agent("shipping".into())))
            .err()
            .unwrap();
        assert!(matches!(err, ExecutorError::Config { .. }));
    }

    #[test]
    fn test_step_override_wins() {
        let pool = AgentPool::default().with_step_executor(
            "inventory",
            Arc::new(StaticExecutor::new("forced", json!({}))),
        );
        let executor = pool.resolve(&spec(ExecutorBinding::Echo)).unwrap();
        assert_eq!(executor.name(), "forced");
    }

    #[test]
    fn test_missing_agents() {
        let workflow = WorkflowConfig {
            name: "remote".into(),
            steps: vec![
                StepConfig {
                    id: "a".into(),
                    label: "A".into(),
                    executor: Some("scanner".into()),
                    ..Default::default()
                },
                StepConfig {
                    id: "b".into(),
                    label: "B".into(),
                    executor: Some("scanner".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let definition = WorkflowDefinition::from_config(&workflow);

        let pool = AgentPool::default();
        assert_eq!(pool.missing_agents(&definition), vec!["scanner".to_string()]);

        let pool = pool.with_executor("scanner", Arc::new(EchoExecutor));
        assert!(pool.missing_agents(&definition).is_empty());
    }
}
