//! Workflow and step configuration

use crate::template::TemplateEngine;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Shape of a workflow's step chain
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Fixed ordered list of steps
    #[default]
    Linear,
    /// Fixed entry, one routed specialist, fixed closing
    Supervisor,
}

/// Prompt shown to the human at a checkpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalConfig {
    /// Title template
    #[serde(default = "default_approval_title")]
    pub title: String,

    /// Message template
    #[serde(default)]
    pub message: String,

    /// Detail templates, rendered in key order
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

fn default_approval_title() -> String {
    "Approval Required".into()
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            title: default_approval_title(),
            message: String::new(),
            details: BTreeMap::new(),
        }
    }
}

/// Configuration for a workflow step
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    /// Step id (unique within workflow)
    pub id: String,

    /// Display label
    pub label: String,

    /// Owning agent name, display only
    pub agent: Option<String>,

    /// Requires a human decision before the run proceeds
    #[serde(default)]
    pub checkpoint: bool,

    /// Expression deciding whether the checkpoint suspends
    pub checkpoint_if: Option<String>,

    /// Placeholder replaced by the routed specialist (supervisor only)
    #[serde(default)]
    pub dispatch: bool,

    /// Named agent from `[agents]` that executes this step
    pub executor: Option<String>,

    /// Inline static payload (string leaves are templates)
    pub output: Option<serde_json::Value>,

    /// Approval prompt for checkpoint steps
    pub approval: Option<ApprovalConfig>,
}

/// Router implementation for supervisor workflows
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RouterKind {
    /// Ordered regex rules over the input
    #[default]
    Keyword,
    /// Remote routing endpoint
    Http,
}

/// A single keyword routing rule
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteRule {
    /// Regex matched against the input message
    pub pattern: String,

    /// Specialist id selected on match
    pub specialist: String,
}

/// Routing configuration for supervisor workflows
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    #[serde(default)]
    pub kind: RouterKind,

    /// Specialist used when no rule matches
    pub default: Option<String>,

    /// Keyword rules, first match wins
    #[serde(default)]
    pub rules: Vec<RouteRule>,

    /// Endpoint for HTTP routers
    pub url: Option<String>,

    /// Timeout in seconds for HTTP routers
    #[serde(default = "default_router_timeout")]
    pub timeout: u64,
}

fn default_router_timeout() -> u64 {
    30
}

/// Full workflow configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Workflow name (the workflow type callers start)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub topology: Topology,

    /// Steps in this workflow
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    /// Allow-list of specialists (supervisor only)
    #[serde(default)]
    pub specialists: Vec<StepConfig>,

    pub router: Option<RouterConfig>,

    /// Template for the final result
    pub result_template: Option<String>,

    /// Template for the result of a rejected run
    pub rejection_template: Option<String>,
}

impl WorkflowConfig {
    /// Validate the workflow configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let engine = TemplateEngine::new();

        if self.name.trim().is_empty() {
            errors.push("workflow name is empty".to_string());
        }
        if self.steps.is_empty() {
            errors.push("workflow has no steps".to_string());
        }

        // Ids must be unique across steps and specialists
        let mut seen_ids = HashSet::new();
        for step in self.steps.iter().chain(self.specialists.iter()) {
            if step.id.trim().is_empty() {
                errors.push(format!("step with label '{}' has an empty id", step.label));
            } else if !seen_ids.insert(step.id.as_str()) {
                errors.push(format!("duplicate step id: {}", step.id));
            }
        }

        for step in self.steps.iter().chain(self.specialists.iter()) {
            validate_step(step, &engine, &mut errors);
        }

        let dispatch_count = self.steps.iter().filter(|s| s.dispatch).count();
        match self.topology {
            Topology::Linear => {
                if dispatch_count > 0 {
                    errors.push("linear workflow cannot have dispatch steps".to_string());
                }
                if !self.specialists.is_empty() {
                    errors.push("linear workflow cannot declare specialists".to_string());
                }
                if self.router.is_some() {
                    errors.push("linear workflow cannot declare a router".to_string());
                }
            }
            Topology::Supervisor => {
                if dispatch_count != 1 {
                    errors.push(format!(
                        "supervisor workflow needs exactly one dispatch step, found {}",
                        dispatch_count
                    ));
                }
                if self.specialists.is_empty() {
                    errors.push("supervisor workflow declares no specialists".to_string());
                }
                for specialist in &self.specialists {
                    if specialist.dispatch {
                        errors.push(format!(
                            "specialist '{}' cannot itself be a dispatch step",
                            specialist.id
                        ));
                    }
                }
                match self.router {
                    Some(ref router) => self.validate_router(router, &mut errors),
                    None => errors.push("supervisor workflow has no router".to_string()),
                }
            }
        }

        for (name, template) in [
            ("result_template", &self.result_template),
            ("rejection_template", &self.rejection_template),
        ] {
            if let Some(template) = template {
                if let Err(e) = engine.validate(template) {
                    errors.push(format!("{} is invalid: {}", name, e));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_router(&self, router: &RouterConfig, errors: &mut Vec<String>) {
        let specialist_ids: HashSet<_> = self.specialists.iter().map(|s| s.id.as_str()).collect();

        if let Some(ref default) = router.default {
            if !specialist_ids.contains(default.as_str()) {
                errors.push(format!("router default '{}' is not a specialist", default));
            }
        }

        match router.kind {
            RouterKind::Keyword => {
                if router.rules.is_empty() && router.default.is_none() {
                    errors.push("keyword router needs rules or a default".to_string());
                }
                for rule in &router.rules {
                    if let Err(e) = regex::Regex::new(&rule.pattern) {
                        errors.push(format!("invalid route pattern '{}': {}", rule.pattern, e));
                    }
                    if !specialist_ids.contains(rule.specialist.as_str()) {
                        errors.push(format!(
                            "route rule targets unknown specialist '{}'",
                            rule.specialist
                        ));
                    }
                }
            }
            RouterKind::Http => {
                if router.url.is_none() {
                    errors.push("http router missing 'url' field".to_string());
                }
            }
        }
    }
}

fn validate_step(step: &StepConfig, engine: &TemplateEngine, errors: &mut Vec<String>) {
    if step.label.trim().is_empty() {
        errors.push(format!("step '{}' has an empty label", step.id));
    }

    if step.checkpoint {
        if step.executor.is_some() || step.output.is_some() {
            errors.push(format!(
                "checkpoint step '{}' cannot bind an executor or output",
                step.id
            ));
        }
        if step.dispatch {
            errors.push(format!("checkpoint step '{}' cannot be a dispatch step", step.id));
        }
    } else {
        if step.approval.is_some() {
            errors.push(format!(
                "step '{}' has an approval prompt but is not a checkpoint",
                step.id
            ));
        }
        if step.checkpoint_if.is_some() {
            errors.push(format!(
                "step '{}' has checkpoint_if but is not a checkpoint",
                step.id
            ));
        }
    }

    if step.executor.is_some() && step.output.is_some() {
        errors.push(format!(
            "step '{}' binds both an executor and an inline output",
            step.id
        ));
    }

    if let Some(ref condition) = step.checkpoint_if {
        let wrapped = format!("{{% if {} %}}{{% endif %}}", condition);
        if let Err(e) = engine.validate(&wrapped) {
            errors.push(format!("step '{}' checkpoint_if is invalid: {}", step.id, e));
        }
    }

    if let Some(ref approval) = step.approval {
        let templates = [&approval.title, &approval.message]
            .into_iter()
            .chain(approval.details.values());
        for template in templates {
            if let Err(e) = engine.validate(template) {
                errors.push(format!("step '{}' approval template is invalid: {}", step.id, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str) -> StepConfig {
        StepConfig {
            id: id.into(),
            label: id.to_uppercase(),
            ..Default::default()
        }
    }

    #[test]
    fn test_step_config_checkpoint() {
        let toml = r#"
            id = "approval"
            label = "Manager Approval"
            agent = "Human"
            checkpoint = true

            [approval]
            title = "Manager Approval Required"
            message = "Order {{ steps.intake.order_id }} needs sign-off"

            [approval.details]
            order_id = "{{ steps.intake.order_id }}"
        "#;
        let step: StepConfig = toml::from_str(toml).unwrap();
        assert!(step.checkpoint);
        assert_eq!(step.agent, Some("Human".into()));
        let approval = step.approval.unwrap();
        assert_eq!(approval.title, "Manager Approval Required");
        assert!(approval.details.contains_key("order_id"));
    }

    #[test]
    fn test_workflow_config_supervisor() {
        let toml = r#"
            name = "dealer"
            topology = "supervisor"

            [[steps]]
            id = "supervisor"
            label = "Supervisor Routing"

            [[steps]]
            id = "specialist"
            label = "Specialist"
            dispatch = true

            [[steps]]
            id = "respond"
            label = "Compose Response"

            [[specialists]]
            id = "finance"
            label = "Finance Options"
            agent = "Finance Specialist"

            [router]
            default = "finance"

            [[router.rules]]
            pattern = "(?i)loan|lease"
            specialist = "finance"
        "#;
        let workflow: WorkflowConfig = toml::from_str(toml).unwrap();
        assert_eq!(workflow.topology, Topology::Supervisor);
        assert_eq!(workflow.steps.len(), 3);
        assert_eq!(workflow.specialists[0].id, "finance");
        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
            id = "intake"
            label = "Intake"
            retries = 3
        "#;
        assert!(toml::from_str::<StepConfig>(toml).is_err());
    }

    #[test]
    fn test_workflow_validation() {
        let workflow = WorkflowConfig {
            name: "broken".into(),
            steps: vec![
                step("intake"),
                step("intake"),
                StepConfig {
                    approval: Some(ApprovalConfig::default()),
                    ..step("review")
                },
                StepConfig {
                    checkpoint: true,
                    executor: Some("inventory".into()),
                    ..step("gate")
                },
                StepConfig {
                    dispatch: true,
                    ..step("slot")
                },
            ],
            ..Default::default()
        };

        let errors = workflow.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("duplicate step id: intake")));
        assert!(errors.iter().any(|e| e.contains("not a checkpoint")));
        assert!(errors.iter().any(|e| e.contains("cannot bind an executor")));
        assert!(errors.iter().any(|e| e.contains("dispatch")));
    }

    #[test]
    fn test_supervisor_validation() {
        let workflow = WorkflowConfig {
            name: "dealer".into(),
            topology: Topology::Supervisor,
            steps: vec![step("supervisor"), step("respond")],
            specialists: vec![step("finance")],
            router: Some(RouterConfig {
                default: Some("service".into()),
                rules: vec![RouteRule {
                    pattern: "([unclosed".into(),
                    specialist: "finance".into(),
                }],
                ..Default::default()
            }),
            ..Default::default()
        };

        let errors = workflow.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("exactly one dispatch step")));
        assert!(errors.iter().any(|e| e.contains("router default 'service'")));
        assert!(errors.iter().any(|e| e.contains("invalid route pattern")));
    }

    #[test]
    fn test_invalid_templates_reported() {
        let workflow = WorkflowConfig {
            name: "templated".into(),
            steps: vec![StepConfig {
                checkpoint: true,
                approval: Some(ApprovalConfig {
                    title: "{{ unclosed".into(),
                    ..Default::default()
                }),
                ..step("gate")
            }],
            result_template: Some("{% if %}".into()),
            ..Default::default()
        };

        let errors = workflow.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("approval template is invalid")));
        assert!(errors.iter().any(|e| e.contains("result_template is invalid")));
    }
}
