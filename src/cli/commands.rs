//! CLI command implementations

use super::output::OutputHandler;
use super::signals::{CancellationToken, with_cancellation};
use crate::config::{WorkflowSource, load_all_workflows, load_workflow};
use crate::coordinator::{ContinueRequest, FlowContext, RunCoordinator, StartRequest};
use crate::events::{FlowEvent, StreamDecoder, StreamItem};
use crate::run::Decision;
use anyhow::{Context, Result, bail};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Exit code for a run interrupted by a signal
const EXIT_INTERRUPTED: i32 = 130;

/// Interpret a command-line input: a JSON object as-is, anything else as a message
pub fn parse_input(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => serde_json::Value::String(raw.to_string()),
    }
}

/// Serve the HTTP API until a signal arrives
pub async fn serve(
    context: FlowContext,
    host: &str,
    port: u16,
    cancel: CancellationToken,
) -> Result<i32> {
    let coordinator = RunCoordinator::new(context);
    crate::server::serve(coordinator, host, port, async move { cancel.cancelled().await }).await?;
    Ok(0)
}

/// Drive a run in-process, asking for each checkpoint decision
///
/// With `decision` set, every checkpoint gets that answer without a prompt.
pub async fn run_workflow(
    context: FlowContext,
    workflow: &str,
    input: serde_json::Value,
    decision: Option<Decision>,
    handler: &dyn OutputHandler,
    cancel: &CancellationToken,
) -> Result<i32> {
    let coordinator = RunCoordinator::new(context);
    let mut stream = coordinator.start(StartRequest::new(workflow, input)).await?;
    tracing::debug!(run_id = %stream.run_id, "Run started");

    loop {
        let terminal = match with_cancellation(cancel, forward(&mut stream.events, handler)).await {
            Some(terminal) => terminal,
            None => return Ok(EXIT_INTERRUPTED),
        };

        match terminal {
            Some(FlowEvent::ApprovalRequired { token, .. }) => {
                let decision = match decision {
                    Some(decision) => decision,
                    None => match with_cancellation(cancel, prompt_decision()).await {
                        Some(answer) => answer?,
                        None => return Ok(EXIT_INTERRUPTED),
                    },
                };
                // A signal during the last stream must not approve the next step
                if cancel.is_cancelled() {
                    return Ok(EXIT_INTERRUPTED);
                }
                stream = coordinator
                    .continue_run(ContinueRequest::new(token, decision))
                    .await?;
            }
            Some(FlowEvent::Response { content, .. }) => {
                handler.result(true, Some(&content));
                return Ok(0);
            }
            Some(FlowEvent::Error { .. }) => {
                handler.result(false, None);
                return Ok(1);
            }
            Some(FlowEvent::Step { .. }) | None => {
                bail!("run stream ended without a terminal event")
            }
        }
    }
}

/// Render events until the terminal one, which is returned
async fn forward(
    events: &mut mpsc::Receiver<FlowEvent>,
    handler: &dyn OutputHandler,
) -> Option<FlowEvent> {
    while let Some(event) = events.recv().await {
        handler.event(&event);
        if event.is_terminal() {
            return Some(event);
        }
    }
    None
}

/// Ask on the terminal until the answer is yes or no
async fn prompt_decision() -> Result<Decision> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stderr = tokio::io::stderr();

    loop {
        stderr.write_all(b"Approve? [y/n] ").await?;
        stderr.flush().await?;

        let mut line = String::new();
        if stdin.read_line(&mut line).await? == 0 {
            bail!("stdin closed while waiting for a decision");
        }
        if let Some(decision) = parse_answer(&line) {
            return Ok(decision);
        }
    }
}

fn parse_answer(line: &str) -> Option<Decision> {
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" | "approve" => Some(Decision::Approve),
        "n" | "no" | "reject" => Some(Decision::Reject),
        _ => None,
    }
}

/// Drive a run on a remote server over its event stream
///
/// Without a decision the command stops at the first checkpoint and prints
/// the token for a later continue.
pub async fn run_remote(
    base_url: &str,
    workflow: &str,
    input: serde_json::Value,
    decision: Option<Decision>,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let client = reqwest::Client::new();
    let base_url = base_url.trim_end_matches('/');

    let body = serde_json::json!({ "workflow_type": workflow, "input": input });
    let mut terminal =
        stream_request(&client, &format!("{}/api/runs/stream", base_url), &body, handler).await?;

    loop {
        match terminal {
            FlowEvent::ApprovalRequired { token, .. } => {
                let Some(decision) = decision else {
                    handler.info(&format!("Run suspended, continue with token {}", token));
                    return Ok(0);
                };
                let body = serde_json::json!({ "token": token, "decision": decision });
                terminal = stream_request(
                    &client,
                    &format!("{}/api/approvals/continue-stream", base_url),
                    &body,
                    handler,
                )
                .await?;
            }
            FlowEvent::Response { content, .. } => {
                handler.result(true, Some(&content));
                return Ok(0);
            }
            FlowEvent::Error { .. } => {
                handler.result(false, None);
                return Ok(1);
            }
            FlowEvent::Step { .. } => bail!("stream ended on a step event"),
        }
    }
}

/// POST and render one event stream, returning its terminal event
async fn stream_request(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
    handler: &dyn OutputHandler,
) -> Result<FlowEvent> {
    let mut response = client
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        bail!("{} returned {}: {}", url, status, text);
    }

    let mut decoder = StreamDecoder::new();
    let mut terminal = None;
    while let Some(chunk) = response.chunk().await.context("Stream interrupted")? {
        for item in decoder.push_bytes(&chunk) {
            match item {
                StreamItem::Event(event) => {
                    handler.event(&event);
                    if event.is_terminal() {
                        terminal = Some(event);
                    }
                }
                StreamItem::Done => {
                    return terminal.context("stream closed without a terminal event");
                }
            }
        }
    }

    for item in decoder.finish() {
        if let StreamItem::Event(event) = item {
            handler.event(&event);
            if event.is_terminal() {
                terminal = Some(event);
            }
        }
    }
    terminal.context("stream ended without a terminal event")
}

/// Validate a workflow
pub fn validate_workflow(
    workflow_name: &str,
    project_dir: Option<&Path>,
    handler: &dyn OutputHandler,
) -> i32 {
    match load_workflow(workflow_name, project_dir) {
        Ok(workflow) => {
            let checkpoints = workflow.steps.iter().filter(|s| s.checkpoint).count();
            handler.info(&format!(
                "✓ Workflow '{}' is valid ({} steps, {} checkpoints)",
                workflow.name,
                workflow.steps.len(),
                checkpoints
            ));
            0
        }
        Err(e) => {
            handler.info(&format!("✗ {:#}", e));
            1
        }
    }
}

/// List available workflows
pub fn list_workflows(project_dir: Option<&Path>, handler: &dyn OutputHandler) -> Result<i32> {
    let workflows = load_all_workflows(project_dir)?;

    for (name, (workflow, source)) in &workflows {
        let source = match source {
            WorkflowSource::Project => "project",
            WorkflowSource::User => "user",
            WorkflowSource::Builtin => "built-in",
        };
        handler.info(&format!("{} ({}, {:?})", name, source, workflow.topology));
        if !workflow.description.is_empty() {
            handler.info(&format!("  {}", workflow.description));
        }
        let chain: Vec<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
        handler.info(&format!("  steps: {}", chain.join(" → ")));
    }

    Ok(0)
}
