//! Sync client for the diagram protocol.
//!
//! ARCHITECTURE
//! ============
//!
//! ```text
//!   input ──▶ canvas::EngineCore ──Action──▶ SyncClient ──▶ CoalesceQueue ──┐
//!                    ▲                           │                        │
//!                    │ push / reply              │ PendingTable           ▼
//!                    └──────── connection driver (tokio-tungstenite) ◀── outbox
//! ```
//!
//! [`SyncClient`] is sans-IO: it owns the engine, the coalescing queue, and
//! the pending-request table, and turns inbound text into state changes and
//! outbound text into outbox messages. [`connection`] owns the socket and
//! drives the client from a single task, so all state mutation is serialized.
//!
//! Time-dependent behaviour takes an explicit `now` so it can be tested
//! without a clock. Coalescing flushes, request expiry and animation frames
//! all run from [`SyncClient::poll_at`] at [`SyncClient::next_deadline`].

pub mod coalesce;
pub mod connection;
pub mod error;
pub mod pending;
pub mod sync;

use std::time::Duration;

pub use coalesce::CoalesceQueue;
pub use connection::{ClientHandle, connect};
pub use error::ClientError;
pub use pending::{PendingTable, ReplyAction};
pub use sync::{ConnectionState, SyncClient, SyncEvent};

/// Default coalescing window for outbound updates.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(250);

/// Default time a request waits for its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between animation steps while any animation runs.
pub const ANIMATION_FRAME: Duration = Duration::from_millis(16);

/// Client tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub coalesce_window: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            coalesce_window: DEFAULT_COALESCE_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}
