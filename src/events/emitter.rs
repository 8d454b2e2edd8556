//! Event sinks that carry a run's events to its observer

use super::event::FlowEvent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Receives events in the order a run generates them
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: FlowEvent);
}

/// Bounded-channel sink feeding one observer stream
///
/// When the observer goes away the run keeps going; events after that
/// point are dropped and the loss is logged once.
#[derive(Debug)]
pub struct ChannelEmitter {
    tx: mpsc::Sender<FlowEvent>,
    detached: AtomicBool,
}

impl ChannelEmitter {
    /// Create an emitter and the receiving half of its stream
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FlowEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                detached: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Whether the observer has dropped its end
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventSink for ChannelEmitter {
    async fn emit(&self, event: FlowEvent) {
        if self.is_detached() {
            return;
        }
        if self.tx.send(event).await.is_err() && !self.detached.swap(true, Ordering::Relaxed) {
            tracing::warn!("Observer disconnected, run continues without a stream");
        }
    }
}
