//! Pending-request table: correlates replies with their waiters.
//!
//! Each entry holds an optional oneshot waiter, a [`ReplyAction`] the client
//! applies to its own state when the reply lands, and a deadline. Entries are
//! removed on reply, on expiry, or when the connection closes; each waiter is
//! resolved exactly once.

#[cfg(test)]
#[path = "pending_test.rs"]
mod pending_test;

use std::collections::HashMap;
use std::time::Instant;

use frames::{Data, EntityRecord};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::ClientError;

/// Result delivered to a request waiter.
pub type Reply = Result<Data, ClientError>;

/// Client-side follow-up applied when a reply (or its failure) arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyAction {
    None,
    /// Resolve a control claim on this entity.
    Claim { id: String },
    /// Control release acknowledged.
    Release { id: String },
    /// Load the returned entity list for this diagram.
    Subscribe { diagram_id: String },
    /// Optimistic create of `id`. On failure the local store goes back to
    /// `previous`, or drops the entity if there was none.
    Create { id: String, previous: Option<Box<EntityRecord>> },
    /// Optimistic remove. On failure `record` is restored.
    Remove { record: Box<EntityRecord> },
}

#[derive(Debug)]
struct Entry {
    waiter: Option<oneshot::Sender<Reply>>,
    action: ReplyAction,
    deadline: Instant,
}

/// Outstanding requests keyed by request id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<String, Entry>,
}

impl PendingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, request_id: &str) -> bool {
        self.entries.contains_key(request_id)
    }

    /// Register a request. A duplicate id replaces the older entry, whose
    /// waiter resolves with [`ClientError::Closed`].
    pub fn insert(
        &mut self,
        request_id: String,
        waiter: Option<oneshot::Sender<Reply>>,
        action: ReplyAction,
        deadline: Instant,
    ) {
        let entry = Entry { waiter, action, deadline };
        if let Some(displaced) = self.entries.insert(request_id.clone(), entry) {
            warn!(%request_id, "duplicate request id; displacing older waiter");
            deliver(displaced.waiter, Err(ClientError::Closed));
        }
    }

    /// Remove an entry and hand back its follow-up and waiter.
    pub fn take(&mut self, request_id: &str) -> Option<(ReplyAction, Option<oneshot::Sender<Reply>>)> {
        self.entries.remove(request_id).map(|e| (e.action, e.waiter))
    }

    /// Earliest deadline among outstanding requests.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.deadline).min()
    }

    /// Expire every entry whose deadline has passed. Waiters resolve with
    /// [`ClientError::Timeout`]; the follow-ups are returned so the caller can
    /// roll back provisional state.
    pub fn expire_at(&mut self, now: Instant) -> Vec<ReplyAction> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|request_id| {
                let entry = self.entries.remove(&request_id)?;
                debug!(%request_id, "request timed out");
                deliver(entry.waiter, Err(ClientError::Timeout));
                Some(entry.action)
            })
            .collect()
    }

    /// Resolve every waiter with [`ClientError::Closed`] and clear the table.
    pub fn fail_all(&mut self) -> Vec<ReplyAction> {
        self.entries
            .drain()
            .map(|(_, entry)| {
                deliver(entry.waiter, Err(ClientError::Closed));
                entry.action
            })
            .collect()
    }
}

/// Resolve a waiter if one is registered. A dropped receiver is not an error.
pub(crate) fn deliver(waiter: Option<oneshot::Sender<Reply>>, reply: Reply) {
    if let Some(tx) = waiter {
        if tx.send(reply).is_err() {
            debug!("request waiter dropped before reply");
        }
    }
}
