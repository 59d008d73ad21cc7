//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router carries the client sync socket at `/ws`, the tracker feed
//! socket at `/motion`, and a health check. Both sockets need the peer address,
//! so the router is always served with connect info.

pub mod motion;
pub mod ws;

use std::net::SocketAddr;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/motion", get(motion::handle_motion))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on `listener` until the process stops.
///
/// # Errors
///
/// Returns the I/O error that ended the accept loop.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>()).await
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
