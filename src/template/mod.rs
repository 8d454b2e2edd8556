//! Template engine for flowgate
//!
//! Jinja2-compatible templating for approval prompts, static step payloads,
//! final results and checkpoint conditions.
//!
//! # Features
//!
//! - Variable substitution: `{{ steps.intake.order_id }}`, `{{ input.message }}`
//! - Filters: `money`, `short_id`, plus the minijinja builtins
//! - Conditionals: `{% if condition %}...{% endif %}`
//! - Expression evaluation for `checkpoint_if`

mod conditionals;
mod context;
mod engine;
mod errors;
mod filters;

pub use conditionals::{evaluate_condition, should_suspend};
pub use context::TemplateContext;
pub use engine::TemplateEngine;
pub use errors::TemplateError;
