//! Approval registry: single-use tokens for suspended runs

mod registry;
mod token;

pub use registry::{ApprovalHandle, ApprovalRegistry};
pub use token::looks_like_token;
