//! Run state machine

mod error;
mod machine;
mod state;

pub use error::{FlowError, StaleReason};
pub use machine::{ApprovalPrompt, Decision, Outcome, RunDriver};
pub use state::{Run, RunState, StepInstance, StepStatus};

#[cfg(test)]
pub(crate) use state::tests::linear_definition;
