mod approval;
mod cli;
mod config;
mod coordinator;
mod events;
mod executor;
mod logging;
mod run;
mod server;
mod step;
mod template;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cli::{CancellationToken, OutputMode};
use coordinator::FlowContext;
use run::Decision;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flowgate")]
#[command(about = "Streaming workflow runs with human approval checkpoints")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory holding .flowgate/ (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Extra config file, applied last
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Answer every checkpoint without prompting
#[derive(Args, Debug, Clone, Copy)]
#[group(multiple = false)]
struct DecisionFlags {
    /// Approve every checkpoint
    #[arg(long)]
    approve: bool,

    /// Reject at the first checkpoint
    #[arg(long)]
    reject: bool,
}

impl DecisionFlags {
    fn decision(&self) -> Option<Decision> {
        match (self.approve, self.reject) {
            (true, _) => Some(Decision::Approve),
            (_, true) => Some(Decision::Reject),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a workflow in-process
    Run {
        /// Workflow name
        workflow: String,

        /// Input message, or a JSON object
        input: String,

        #[command(flatten)]
        decision: DecisionFlags,

        /// Output format: console, json or quiet
        #[arg(long, default_value = "console")]
        output: String,
    },

    /// Run a workflow on a remote flowgate server
    Client {
        /// Server base URL
        url: String,

        /// Workflow name
        workflow: String,

        /// Input message, or a JSON object
        input: String,

        #[command(flatten)]
        decision: DecisionFlags,

        /// Output format: console, json or quiet
        #[arg(long, default_value = "console")]
        output: String,
    },

    /// Validate a workflow without running
    Validate {
        /// Workflow name
        workflow: String,
    },

    /// List available workflows
    Workflows,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // The server keeps a log file unless told where to put one
    let log_file = match (&cli.log_file, &cli.command) {
        (Some(path), _) => Some(path.clone()),
        (None, Commands::Serve { .. }) => logging::default_log_path("serve").ok(),
        (None, _) => None,
    };
    let _log_guard = logging::init_logging(cli.debug, cli.quiet, log_file.as_deref())?;

    let project_dir = cli.dir.as_deref();
    let mode_for = |output: &str| {
        if cli.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::from_str(output)
        }
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = cli::setup_signal_handlers(signal_token).await {
            tracing::warn!(error = %e, "Failed to install signal handlers");
        }
    });

    let exit_code = match cli.command {
        Commands::Serve { host, port } => {
            let context = FlowContext::load(project_dir, cli.config.as_deref())?;
            let host = host.unwrap_or_else(|| context.config.server.host.clone());
            let port = port.unwrap_or(context.config.server.port);
            cli::serve(context, &host, port, cancel).await?
        }

        Commands::Run {
            workflow,
            input,
            decision,
            output,
        } => {
            let context = FlowContext::load(project_dir, cli.config.as_deref())?;
            let handler = cli::create_handler(mode_for(&output), cli.debug);
            cli::run_workflow(
                context,
                &workflow,
                cli::parse_input(&input),
                decision.decision(),
                &*handler,
                &cancel,
            )
            .await?
        }

        Commands::Client {
            url,
            workflow,
            input,
            decision,
            output,
        } => {
            let handler = cli::create_handler(mode_for(&output), cli.debug);
            cli::run_remote(
                &url,
                &workflow,
                cli::parse_input(&input),
                decision.decision(),
                &*handler,
            )
            .await?
        }

        Commands::Validate { workflow } => {
            let handler = cli::create_handler(mode_for("console"), cli.debug);
            cli::validate_workflow(&workflow, project_dir, &*handler)
        }

        Commands::Workflows => {
            let handler = cli::create_handler(mode_for("console"), cli.debug);
            cli::list_workflows(project_dir, &*handler)?
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
