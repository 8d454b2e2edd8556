//! Expression evaluation for conditional checkpoints
//!
//! Evaluates expressions like `input.amount > 200` against a template context.

use super::context::TemplateContext;
use super::errors::TemplateError;

/// Evaluate a conditional expression against a context
///
/// Supports:
/// - Variable access: `steps.validation.status`, `input.amount`
/// - Comparison: `==`, `!=`, `<`, `>`, `<=`, `>=`
/// - Boolean: `and`, `or`, `not`
/// - Tests: `is defined`, `is not defined`
/// - Literals: `'string'`, `"string"`, `true`, `false`, numbers
pub fn evaluate_condition(expr: &str, ctx: &TemplateContext) -> Result<bool, TemplateError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(true); // Empty condition is always true
    }

    // Lenient environment so missing input fields read as falsy
    let mut env = minijinja::Environment::new();
    super::filters::register_filters(&mut env);

    let template_str = format!("{{% if {expr} %}}true{{% else %}}false{{% endif %}}");

    env.add_template("expr", &template_str)
        .map_err(|e| TemplateError::expression(format!("invalid expression syntax: {}", e)))?;

    let template = env
        .get_template("expr")
        .map_err(|e| TemplateError::expression(format!("failed to get template: {}", e)))?;

    let result = template.render(ctx.to_value()).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("undefined") {
            let var_name = extract_undefined_var(&msg);
            TemplateError::undefined_variable(var_name, &ctx.known_variables())
        } else {
            TemplateError::expression(msg)
        }
    })?;

    Ok(result == "true")
}

/// Extract variable name from an undefined error message
fn extract_undefined_var(msg: &str) -> String {
    if let Some(pos) = msg.find("undefined") {
        let after = &msg[pos..];
        if let Some(colon) = after.find(':') {
            let var_part = after[colon + 1..].trim();
            return var_part
                .split_whitespace()
                .next()
                .unwrap_or("unknown")
                .to_string();
        }
    }
    "unknown".to_string()
}

/// Check whether a checkpoint should suspend the run
///
/// Returns true if:
/// - No condition specified
/// - Condition evaluates to true
pub fn should_suspend(
    condition: Option<&str>,
    ctx: &TemplateContext,
) -> Result<bool, TemplateError> {
    match condition {
        None => Ok(true),
        Some(cond) => evaluate_condition(cond, ctx),
    }
}
