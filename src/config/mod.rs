//! Configuration types and loading for flowgate

mod agent;
pub(crate) mod builtin;
mod loader;
mod workflow;

pub use agent::{AgentConfig, AgentKind};
pub use loader::{
    FlowgateConfig, RegistrySettings, ServerSettings, WorkflowSource, load_all_workflows,
    load_workflow,
};
pub use workflow::{
    ApprovalConfig, RouteRule, RouterConfig, RouterKind, StepConfig, Topology, WorkflowConfig,
};
