//! Line-oriented stream encoding and its client-side decoder
//!
//! Each event travels as `data: <json>` followed by a blank line; the stream
//! ends with `data: [DONE]`.

use super::event::FlowEvent;
use crate::run::StepInstance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Sentinel payload closing every stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// JSON payload of one event
pub fn encode_data(event: &FlowEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Item recovered from a stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(FlowEvent),
    Done,
}

/// Incremental decoder for a pushed event stream
///
/// Feed it arbitrary chunks; complete `data:` lines come back as events.
/// Comments, other SSE fields and payloads that are not a known event are
/// skipped.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: String,
    pending: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sentinel has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode every complete line in `chunk`
    pub fn push(&mut self, chunk: &str) -> Vec<StreamItem> {
        self.buffer.push_str(chunk);

        let mut items = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if let Some(item) = self.decode_line(line.trim_end_matches(['\r', '\n'])) {
                items.push(item);
            }
        }
        items
    }

    /// Decode raw transport bytes; a UTF-8 sequence split across chunks
    /// is held back until it completes
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<StreamItem> {
        self.pending.extend_from_slice(chunk);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return self.push(&text);
            }
        };
        let rest = self.pending.split_off(valid);
        let head = std::mem::replace(&mut self.pending, rest);
        let text = String::from_utf8_lossy(&head).into_owned();
        self.push(&text)
    }

    /// Decode whatever is left once the transport closes
    pub fn finish(&mut self) -> Vec<StreamItem> {
        let mut rest = std::mem::take(&mut self.buffer);
        let pending = std::mem::take(&mut self.pending);
        rest.push_str(&String::from_utf8_lossy(&pending));
        self.decode_line(rest.trim()).into_iter().collect()
    }

    fn decode_line(&mut self, line: &str) -> Option<StreamItem> {
        if self.done {
            return None;
        }
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload == DONE_SENTINEL {
            self.done = true;
            return Some(StreamItem::Done);
        }
        match serde_json::from_str::<FlowEvent>(payload) {
            Ok(event) => Some(StreamItem::Event(event)),
            Err(e) => {
                tracing::debug!(error = %e, payload, "Ignoring unparseable stream line");
                None
            }
        }
    }
}

/// Approval prompt in a flattened response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSummary {
    pub token: String,
    pub title: String,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

/// Non-streamed rendition of one stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlattenedResponse {
    pub run_id: Option<String>,

    /// Final result text, when the run finished
    pub response: Option<String>,

    /// Last step snapshot seen
    pub workflow_steps: Vec<StepInstance>,

    /// Pending checkpoint, when the run suspended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlattenedResponse {
    /// Fold one event into the response
    pub fn apply(&mut self, event: FlowEvent) {
        if let Some(run_id) = event.run_id() {
            self.run_id = Some(run_id.to_string());
        }
        if let Some(steps) = event.all_steps() {
            self.workflow_steps = steps.to_vec();
        }
        match event {
            FlowEvent::Step { .. } => {}
            FlowEvent::ApprovalRequired {
                token,
                title,
                message,
                details,
                ..
            } => {
                self.approval = Some(ApprovalSummary {
                    token,
                    title,
                    message,
                    details,
                });
            }
            FlowEvent::Response { content, .. } => self.response = Some(content),
            FlowEvent::Error { content, .. } => self.error = Some(content),
        }
    }

}

/// Drain a run stream into a single response
pub async fn collect_flattened(mut rx: mpsc::Receiver<FlowEvent>) -> FlattenedResponse {
    let mut flattened = FlattenedResponse::default();
    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        flattened.apply(event);
        if terminal {
            break;
        }
    }
    flattened
}
