//! Trailing-edge throttle for outbound entity updates.
//!
//! The first patch after an idle period goes out immediately and opens a
//! window of length `W`. Patches enqueued while the window is open merge into
//! a pending map keyed by collection and entity id, last write winning per
//! field. When the window elapses the pending patches flush and a new window
//! opens; an empty flush closes the window so the next patch is sent at once.
//!
//! For one entity under continuous mutation the wire therefore sees at most
//! one update per window, and the last flushed patch carries the last value.

#[cfg(test)]
#[path = "coalesce_test.rs"]
mod coalesce_test;

use std::time::{Duration, Instant};

use frames::{Collection, Data};
use serde_json::Value;
use tracing::debug;

/// An update ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub collection: Collection,
    pub patch: Data,
}

#[derive(Debug)]
struct Batch {
    collection: Collection,
    /// Entity id and merged patch, in first-enqueued order.
    entries: Vec<(String, Data)>,
}

/// Per-client coalescing queue.
#[derive(Debug)]
pub struct CoalesceQueue {
    window: Duration,
    /// End of the open window, if one is open.
    window_end: Option<Instant>,
    batches: Vec<Batch>,
}

impl CoalesceQueue {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, window_end: None, batches: Vec::new() }
    }

    /// Whether a window is currently open.
    #[must_use]
    pub fn is_window_open(&self) -> bool {
        self.window_end.is_some()
    }

    /// When [`CoalesceQueue::poll_at`] next has work to do.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.window_end
    }

    /// Number of entity patches waiting for the window to close.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.batches.iter().map(|b| b.entries.len()).sum()
    }

    /// Enqueue a patch. Returns it back for immediate sending when no window
    /// is open, and opens one.
    ///
    /// Patches without a string `id` cannot be keyed and always go out
    /// immediately.
    pub fn enqueue_at(&mut self, collection: Collection, patch: Data, now: Instant) -> Option<Outgoing> {
        let Some(id) = patch.get("id").and_then(Value::as_str).map(str::to_owned) else {
            debug!(%collection, "patch without id bypasses coalescing");
            return Some(Outgoing { collection, patch });
        };

        if self.window_end.is_none() {
            self.window_end = Some(now + self.window);
            return Some(Outgoing { collection, patch });
        }

        let batch = self.batch_mut(collection);
        match batch.entries.iter_mut().find(|(key, _)| *key == id) {
            Some((_, merged)) => merged.extend(patch),
            None => batch.entries.push((id, patch)),
        }
        None
    }

    /// Flush if the window has elapsed.
    ///
    /// Returns the patches to send, in collection then first-enqueued order.
    /// A non-empty flush re-opens the window; an empty one closes it.
    pub fn poll_at(&mut self, now: Instant) -> Vec<Outgoing> {
        match self.window_end {
            Some(end) if now >= end => {}
            _ => return Vec::new(),
        }

        let flushed: Vec<Outgoing> = self
            .batches
            .drain(..)
            .flat_map(|batch| {
                let collection = batch.collection;
                batch.entries.into_iter().map(move |(_, patch)| Outgoing { collection, patch })
            })
            .collect();

        self.window_end = if flushed.is_empty() { None } else { Some(now + self.window) };
        flushed
    }

    /// Drop everything and close the window.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.window_end = None;
    }

    fn batch_mut(&mut self, collection: Collection) -> &mut Batch {
        let index = match self.batches.iter().position(|b| b.collection == collection) {
            Some(i) => i,
            None => {
                self.batches.push(Batch { collection, entries: Vec::new() });
                self.batches.len() - 1
            }
        };
        &mut self.batches[index]
    }
}
