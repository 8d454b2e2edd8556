//! Output handlers for CLI commands
//!
//! Render run events as console progress, JSON lines, or nothing but the
//! final result.

use crate::events::FlowEvent;
use crate::run::{StepInstance, StepStatus};
use serde::Serialize;
use std::io::{self, Write};

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "quiet" => Self::Quiet,
            _ => Self::Console,
        }
    }
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Render one run event
    fn event(&self, event: &FlowEvent);

    /// Informational line outside any run
    fn info(&self, message: &str);

    /// Write final result
    fn result(&self, success: bool, output: Option<&str>);
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// `[2/5] Inventory Agent (Inventory)`
    fn step_line(step: &StepInstance, all_steps: &[StepInstance]) -> String {
        let index = all_steps
            .iter()
            .position(|s| s.id == step.id)
            .map(|i| i + 1)
            .unwrap_or(0);
        match step.agent {
            Some(ref agent) => {
                format!("[{}/{}] {} ({})", index, all_steps.len(), step.label, agent)
            }
            None => format!("[{}/{}] {}", index, all_steps.len(), step.label),
        }
    }
}

impl OutputHandler for ConsoleHandler {
    fn event(&self, event: &FlowEvent) {
        match event {
            FlowEvent::Step {
                step, all_steps, ..
            } => match step.status {
                StepStatus::Active => {
                    eprint!("{}... ", Self::step_line(step, all_steps));
                    let _ = io::stderr().flush();
                }
                StepStatus::Complete => {
                    let skipped = step
                        .result
                        .as_ref()
                        .and_then(|r| r.get("decision"))
                        .and_then(|d| d.as_str())
                        == Some("skipped");
                    if skipped {
                        eprintln!("- (skipped)");
                    } else {
                        eprintln!("✓");
                    }
                    if self.debug {
                        if let Some(ref result) = step.result {
                            eprintln!("[debug] {}", result);
                        }
                    }
                }
                StepStatus::Rejected => eprintln!("✗ (rejected)"),
                StepStatus::Pending => {}
            },
            FlowEvent::ApprovalRequired {
                token,
                title,
                message,
                details,
                ..
            } => {
                eprintln!("awaiting approval");
                eprintln!();
                eprintln!("  {}", title);
                eprintln!("  {}", message);
                for (key, value) in details {
                    eprintln!("    {}: {}", key, value);
                }
                eprintln!("  token: {}", token);
                eprintln!();
            }
            FlowEvent::Response { .. } => {}
            FlowEvent::Error { content, .. } => {
                eprintln!();
                eprintln!("Error: {}", content);
            }
        }
    }

    fn info(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            eprintln!();
            println!("{}", out);
        }
    }
}

/// JSON lines output handler
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        if let Ok(s) = json {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn event(&self, event: &FlowEvent) {
        self.print_json(event);
    }

    fn info(&self, message: &str) {
        self.print_json(&serde_json::json!({ "type": "info", "message": message }));
    }

    fn result(&self, _success: bool, _output: Option<&str>) {
        // The terminal event already carried the result
    }
}

/// Quiet handler that prints only the final result
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn event(&self, _event: &FlowEvent) {}
    fn info(&self, _message: &str) {}
    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            println!("{}", out);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler::new(false)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
