//! Template context for variable resolution

use minijinja::value::{Object, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Context available to templates during rendering
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Run input, always a JSON object
    pub input: serde_json::Value,

    /// Results of completed steps, keyed by step id
    pub steps: BTreeMap<String, serde_json::Value>,

    /// Current run id
    pub run_id: Option<String>,

    /// Workflow name
    pub workflow: Option<String>,

    /// Specialist chosen by the router (supervisor workflows)
    pub route: Option<String>,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            input: serde_json::Value::Object(Default::default()),
            ..Default::default()
        }
    }

    /// Create a context over a run input
    pub fn with_input(input: serde_json::Value) -> Self {
        Self {
            input,
            ..Self::new()
        }
    }

    /// Add a step result to the context
    pub fn add_step(&mut self, id: impl Into<String>, result: serde_json::Value) {
        self.steps.insert(id.into(), result);
    }

    pub fn set_run_id(&mut self, run_id: impl Into<String>) {
        self.run_id = Some(run_id.into());
    }

    pub fn set_workflow(&mut self, name: impl Into<String>) {
        self.workflow = Some(name.into());
    }

    pub fn set_route(&mut self, specialist: impl Into<String>) {
        self.route = Some(specialist.into());
    }

    /// Convert to a minijinja Value for template rendering
    pub fn to_value(&self) -> Value {
        Value::from_object(ContextObject(self.clone()))
    }

    /// Get list of known top-level variable names for error suggestions
    pub fn known_variables(&self) -> Vec<&str> {
        let mut vars = vec!["input", "steps", "env"];
        if self.run_id.is_some() {
            vars.push("run_id");
        }
        if self.workflow.is_some() {
            vars.push("workflow");
        }
        if self.route.is_some() {
            vars.push("route");
        }
        vars.extend(self.known_steps());
        vars
    }

    /// Get list of known step ids for error suggestions
    pub fn known_steps(&self) -> Vec<&str> {
        self.steps.keys().map(|s| s.as_str()).collect()
    }
}

/// Wrapper to implement minijinja::Object for TemplateContext
#[derive(Debug, Clone)]
struct ContextObject(TemplateContext);

impl fmt::Display for ContextObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TemplateContext")
    }
}

impl Object for ContextObject {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "input" => Some(Value::from_serialize(&self.0.input)),
            "steps" => Some(Value::from_object(StepsObject(self.0.steps.clone()))),
            "run_id" => self.0.run_id.as_ref().map(|r| Value::from(r.clone())),
            "workflow" => self.0.workflow.as_ref().map(|w| Value::from(w.clone())),
            "route" => self.0.route.as_ref().map(|r| Value::from(r.clone())),
            "env" => Some(Value::from_object(EnvObject)),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> minijinja::value::Enumerator {
        minijinja::value::Enumerator::Str(&["input", "steps", "run_id", "workflow", "route", "env"])
    }
}

/// Object for accessing step results
#[derive(Debug, Clone)]
struct StepsObject(BTreeMap<String, serde_json::Value>);

impl fmt::Display for StepsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "steps")
    }
}

impl Object for StepsObject {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let result = self.0.get(key.as_str()?)?;
        Some(Value::from_serialize(result))
    }

    fn enumerate(self: &Arc<Self>) -> minijinja::value::Enumerator {
        minijinja::value::Enumerator::Values(
            self.0.keys().map(|k| Value::from(k.clone())).collect(),
        )
    }
}

/// Object for lazy environment variable access
#[derive(Debug, Clone, Copy)]
struct EnvObject;

impl fmt::Display for EnvObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env")
    }
}

impl Object for EnvObject {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let var_name = key.as_str()?;
        std::env::var(var_name).ok().map(Value::from)
    }

    fn enumerate(self: &Arc<Self>) -> minijinja::value::Enumerator {
        // Don't enumerate env vars - too many and potentially sensitive
        minijinja::value::Enumerator::Empty
    }
}
