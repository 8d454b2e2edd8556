//! Step model: workflow definitions and their lookup

mod catalog;
mod definition;

pub use catalog::DefinitionCatalog;
pub use definition::{ExecutorBinding, StepSpec, WorkflowDefinition};
