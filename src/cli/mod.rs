//! CLI module for flowgate
//!
//! This module provides:
//! - Command implementations (serve, run, client, validate, workflows)
//! - Output handlers (console, JSON, quiet)
//! - Signal handling for graceful shutdown

pub mod commands;
pub mod output;
pub mod signals;

pub use commands::{list_workflows, parse_input, run_remote, run_workflow, serve, validate_workflow};
pub use output::{OutputMode, create_handler};
pub use signals::{CancellationToken, setup_signal_handlers};
