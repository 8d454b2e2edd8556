//! Template engine for approval prompts, static payloads and results

use super::context::TemplateContext;
use super::errors::TemplateError;
use super::filters;
use minijinja::Environment;

/// Template rendering engine
///
/// Wraps minijinja with custom filters and strict undefined handling.
#[derive(Clone)]
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine").finish_non_exhaustive()
    }
}

impl TemplateEngine {
    /// Create a new template engine with default configuration
    pub fn new() -> Self {
        let mut env = Environment::new();

        // Configure strict undefined handling
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);

        filters::register_filters(&mut env);

        Self { env }
    }

    /// Render a template string with the given context
    ///
    /// # Example
    ///
    /// ```ignore
    /// let engine = TemplateEngine::new();
    /// let mut ctx = TemplateContext::with_input(json!({ "message": "2 widgets" }));
    /// ctx.add_step("intake", json!({ "order_id": "ORD-7" }));
    ///
    /// let result = engine.render("Order {{ steps.intake.order_id }}", &ctx)?;
    /// assert_eq!(result, "Order ORD-7");
    /// ```
    pub fn render(&self, template: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
        let mut env = self.env.clone();
        env.add_template("__render__", template)
            .map_err(|e| TemplateError::syntax(e.to_string(), e.line().unwrap_or(0), 0))?;

        let tmpl = env
            .get_template("__render__")
            .map_err(TemplateError::Internal)?;

        tmpl.render(ctx.to_value())
            .map_err(|e| convert_minijinja_error(e, ctx))
    }

    /// Render a template and return the result trimmed
    pub fn render_trimmed(
        &self,
        template: &str,
        ctx: &TemplateContext,
    ) -> Result<String, TemplateError> {
        self.render(template, ctx).map(|s| s.trim().to_string())
    }

    /// Render every string leaf of a JSON payload
    ///
    /// Non-string leaves pass through unchanged; object keys are not templated.
    pub fn render_value(
        &self,
        value: &serde_json::Value,
        ctx: &TemplateContext,
    ) -> Result<serde_json::Value, TemplateError> {
        use serde_json::Value;

        Ok(match value {
            Value::String(s) if s.contains("{{") || s.contains("{%") => {
                Value::String(self.render(s, ctx)?)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.render_value(item, ctx))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut rendered = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    rendered.insert(key.clone(), self.render_value(item, ctx)?);
                }
                Value::Object(rendered)
            }
            other => other.clone(),
        })
    }

    /// Check if a template is syntactically valid
    pub fn validate(&self, template: &str) -> Result<(), TemplateError> {
        let mut env = self.env.clone();
        env.add_template("__validate__", template)
            .map_err(|e| TemplateError::syntax(e.to_string(), e.line().unwrap_or(0), 0))?;
        Ok(())
    }
}

/// Convert a minijinja error to our TemplateError type
fn convert_minijinja_error(err: minijinja::Error, ctx: &TemplateContext) -> TemplateError {
    let msg = err.to_string();
    let line = err.line().unwrap_or(0);

    if msg.contains("undefined") {
        let var_name = extract_var_from_error(&msg);
        return TemplateError::undefined_variable_at(var_name, line, 0, &ctx.known_variables());
    }

    if msg.contains("not iterable") || msg.contains("cannot be iterated") {
        return TemplateError::type_mismatch("iterable", "non-iterable value");
    }

    if msg.contains("filter") {
        return TemplateError::filter("unknown", msg);
    }

    TemplateError::syntax(msg, line, 0)
}

/// Extract variable name from minijinja error message
fn extract_var_from_error(msg: &str) -> String {
    // Messages look like: "undefined value (in <string>:1): variable is `steps.foo`"
    if let Some(start) = msg.find('`') {
        if let Some(end) = msg[start + 1..].find('`') {
            return msg[start + 1..start + 1 + end].to_string();
        }
    }
    "unknown".to_string()
}
