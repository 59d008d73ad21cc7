//! Tracker feed socket.
//!
//! Each text message is one [`MotionSample`]. Malformed samples are logged
//! and skipped; the feed stays open.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use tracing::{debug, info, warn};

use crate::services::motion::{self, MotionSample};
use crate::state::AppState;

pub async fn handle_motion(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_motion(socket, state, addr.ip().to_string()))
}

async fn run_motion(mut socket: WebSocket, state: AppState, source_addr: String) {
    info!(%source_addr, "motion: feed connected");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<MotionSample>(&text) {
                Ok(sample) => {
                    let applied = motion::ingest(&state, &sample, Some(&source_addr)).await;
                    debug!(%source_addr, time = sample.time, applied = applied.len(), "motion: sample");
                }
                Err(e) => warn!(%source_addr, error = %e, "motion: invalid sample"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!(%source_addr, "motion: feed disconnected");
}
