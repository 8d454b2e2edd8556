//! Run-lifetime store of pending approvals
//!
//! Maps each outstanding token to the handle it was minted for and the
//! continuation it unlocks. Redeeming removes the entry under the lock, so
//! of any number of concurrent redeemers exactly one receives the
//! continuation and the rest see a stale approval.

use super::token::new_token;
use crate::run::{FlowError, StaleReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Externally presentable reference to a suspended run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalHandle {
    pub token: String,
    pub run_id: String,

    /// Cursor of the checkpoint at suspension
    pub cursor: usize,

    pub created_at: DateTime<Utc>,
}

struct Entry<T> {
    handle: ApprovalHandle,
    continuation: T,
}

struct Inner<T> {
    by_token: HashMap<String, Entry<T>>,
    by_run: HashMap<String, String>,
}

impl<T> Inner<T> {
    fn remove(&mut self, token: &str) -> Option<Entry<T>> {
        let entry = self.by_token.remove(token)?;
        if self.by_run.get(&entry.handle.run_id).map(String::as_str) == Some(token) {
            self.by_run.remove(&entry.handle.run_id);
        }
        Some(entry)
    }
}

/// Approval registry shared by every request a coordinator serves
pub struct ApprovalRegistry<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for ApprovalRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ApprovalRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                by_token: HashMap::new(),
                by_run: HashMap::new(),
            })),
        }
    }
}

impl<T> std::fmt::Debug for ApprovalRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalRegistry").finish_non_exhaustive()
    }
}

impl<T: Send> ApprovalRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a token for a run suspended at `cursor`
    ///
    /// A run holds at most one handle; any earlier handle for the same run
    /// is dropped along with its continuation.
    pub async fn register(&self, run_id: &str, cursor: usize, continuation: T) -> ApprovalHandle {
        let handle = ApprovalHandle {
            token: new_token(),
            run_id: run_id.to_string(),
            cursor,
            created_at: Utc::now(),
        };

        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.by_run.insert(run_id.to_string(), handle.token.clone()) {
            inner.by_token.remove(&previous);
            tracing::warn!(run_id, token = %previous, "Replaced outstanding approval handle");
        }
        inner.by_token.insert(
            handle.token.clone(),
            Entry {
                handle: handle.clone(),
                continuation,
            },
        );

        tracing::debug!(run_id, token = %handle.token, cursor, "Registered approval");
        handle
    }

    /// Look a token up without consuming it
    pub async fn resolve(&self, token: &str) -> Option<ApprovalHandle> {
        let inner = self.inner.lock().await;
        inner.by_token.get(token).map(|e| e.handle.clone())
    }

    /// Drop a token; returns whether it was outstanding
    pub async fn invalidate(&self, token: &str) -> bool {
        self.inner.lock().await.remove(token).is_some()
    }

    /// Resolve and invalidate in one step, handing over the continuation
    ///
    /// `check` runs under the lock before anything is removed; when it
    /// refuses, the entry stays registered and its error is returned.
    pub async fn redeem<F>(&self, token: &str, check: F) -> Result<(ApprovalHandle, T), FlowError>
    where
        F: FnOnce(&ApprovalHandle, &T) -> Result<(), FlowError>,
    {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .by_token
            .get(token)
            .ok_or_else(|| FlowError::stale(token, StaleReason::UnknownToken))?;
        check(&entry.handle, &entry.continuation)?;

        let entry = inner
            .remove(token)
            .ok_or_else(|| FlowError::stale(token, StaleReason::UnknownToken))?;
        drop(inner);

        tracing::debug!(run_id = %entry.handle.run_id, token, "Redeemed approval");
        Ok((entry.handle, entry.continuation))
    }

    /// Handle currently outstanding for a run
    pub async fn handle_for_run(&self, run_id: &str) -> Option<ApprovalHandle> {
        let inner = self.inner.lock().await;
        let token = inner.by_run.get(run_id)?;
        inner.by_token.get(token).map(|e| e.handle.clone())
    }

    /// Drop every handle older than `max_idle`, returning what was evicted
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<ApprovalHandle> {
        let cutoff = match chrono::Duration::from_std(max_idle) {
            Ok(age) => Utc::now() - age,
            Err(_) => return Vec::new(),
        };

        let mut inner = self.inner.lock().await;
        let stale: Vec<String> = inner
            .by_token
            .values()
            .filter(|e| e.handle.created_at < cutoff)
            .map(|e| e.handle.token.clone())
            .collect();

        let evicted: Vec<ApprovalHandle> = stale
            .iter()
            .filter_map(|token| inner.remove(token).map(|e| e.handle))
            .collect();

        for handle in &evicted {
            tracing::info!(run_id = %handle.run_id, token = %handle.token, "Evicted idle approval");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_token.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
