//! Step executor and router collaborators
//!
//! A run calls a [`StepExecutor`] for every non-checkpoint step and, for
//! supervisor workflows, a [`Router`] once at start.

mod fixed;
mod http;
mod pool;
mod retry;
mod router;
mod types;

pub use pool::AgentPool;
pub use router::{RouteRequest, Router, RouterError, build_router};
pub use types::StepRequest;

#[cfg(test)]
pub(crate) use types::{ExecutorError, StepExecutor, StepOutput};
