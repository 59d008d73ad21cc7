//! WebSocket handler for sync clients.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client id, registers the connection, and enters a
//! `select!` loop:
//! - Incoming text frames → decode + dispatch by request type
//! - Pushes queued by peers' requests → forward to this client
//!
//! Handler functions are business logic only. They call services and return
//! an `Outcome`; the dispatch layer owns every outbound concern: the reply to
//! the requester (only when it sent a `requestId`) and fan-out to peers.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register → push `connected` with `clientId`
//! 2. Client sends requests → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast / direct push)
//! 4. Close → unregister → release held control and broadcast the releases

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use frames::{
    Collection, ControlClaim, ControlRelease, Data, LiveMotion, ProtocolError, Push, RawRequest, Request,
    Welcome,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::frame::{ErrorCode, error_reply, failed_reply, flag_reply};
use crate::services::RequestError;
use crate::services::broadcast::{Audience, broadcast, send_to};
use crate::services::control::{self, ClaimOutcome};
use crate::services::document;
use crate::state::{AppState, ConnectedClient, new_client_id};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send directly.
#[derive(Debug)]
enum Outcome {
    /// Reply to the requester only.
    Reply(Data),
    /// Reply to the requester, push to the audience excluding the requester.
    ReplyAndBroadcast { reply: Data, push: Push, audience: Audience },
    /// Reply to the requester, push to every open connection including it.
    ReplyAndBroadcastAll { reply: Data, push: Push },
    /// Reply to the requester, then queue a push for the requester alone.
    ReplyAndDirect { reply: Data, push: Push },
    /// Reply to the requester, push each entry to its audience, excluding the
    /// requester, in order.
    ReplyAndBroadcastEach { reply: Data, pushes: Vec<(Push, Audience)> },
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state, addr.ip().to_string()))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, remote_addr: String) {
    let client_id = new_client_id();

    // Per-connection channel for pushes queued by other connections.
    let (client_tx, mut client_rx) = mpsc::channel::<Push>(state.config.client_channel_capacity);
    state
        .connect(&client_id, ConnectedClient::new(client_tx, Some(remote_addr.clone())))
        .await;

    let welcome = Push::Connected(Welcome { client_id: client_id.clone() });
    if send_push(&mut socket, &welcome).await.is_ok() {
        info!(%client_id, %remote_addr, "ws: client connected");

        loop {
            tokio::select! {
                msg = socket.recv() => {
                    let Some(Ok(msg)) = msg else { break };
                    match msg {
                        Message::Text(text) => {
                            if dispatch_text(&state, &mut socket, &client_id, &text).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                Some(push) = client_rx.recv() => {
                    if send_push(&mut socket, &push).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    disconnect(&state, &client_id).await;
    info!(%client_id, "ws: client disconnected");
}

/// Unregister a connection and broadcast the release of everything it held.
async fn disconnect(state: &AppState, client_id: &str) {
    state.disconnect(client_id).await;
    for key in control::release_all(state, client_id).await {
        let push = Push::EntityUpdate(control::released_patch(&key));
        broadcast(state, &Audience::Diagram(key.diagram_id.clone()), &push, None).await;
    }
}

async fn dispatch_text(state: &AppState, socket: &mut WebSocket, client_id: &str, text: &str) -> Result<(), ()> {
    for reply in process_inbound_text(state, client_id, text).await {
        socket.send(Message::Text(reply.into())).await.map_err(|_| ())?;
    }
    Ok(())
}

async fn send_push(socket: &mut WebSocket, push: &Push) -> Result<(), ()> {
    let text = match frames::encode_push(push) {
        Ok(text) => text,
        Err(e) => {
            warn!(kind = push.kind(), error = %e, "ws: push encode failed");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await.map_err(|_| ())
}

// =============================================================================
// REQUEST DISPATCH
// =============================================================================

/// Decode and process one inbound text frame and return the encoded replies
/// for the sender.
///
/// This keeps the websocket transport separate from request handling, so
/// tests can drive dispatch and broadcast behavior without a socket.
async fn process_inbound_text(state: &AppState, client_id: &str, text: &str) -> Vec<String> {
    let raw = match frames::decode_request(text) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound message");
            let err = RequestError::from(ProtocolError::InvalidPayload(e.to_string()));
            return salvage_request_id(text)
                .and_then(|rid| encode_reply(&rid, error_reply(&err)))
                .into_iter()
                .collect();
        }
    };

    info!(
        %client_id,
        kind = %raw.kind,
        collection = raw.collection.as_deref().unwrap_or("-"),
        request_id = raw.request_id.as_deref().unwrap_or("-"),
        "ws: recv request"
    );

    let outcome = match Request::from_raw(&raw) {
        Ok(request) => handle_request(state, client_id, request).await,
        Err(e) => {
            let err = RequestError::from(e);
            warn!(%client_id, kind = %raw.kind, code = err.error_code(), error = %err, "ws: rejected request");
            Outcome::Reply(error_reply(&err))
        }
    };

    apply_outcome(state, client_id, &raw, outcome).await
}

/// Deliver pushes named by `outcome` and encode the sender's reply.
async fn apply_outcome(state: &AppState, client_id: &str, raw: &RawRequest, outcome: Outcome) -> Vec<String> {
    let reply = match outcome {
        Outcome::Reply(reply) => reply,
        Outcome::ReplyAndBroadcast { reply, push, audience } => {
            broadcast(state, &audience, &push, Some(client_id)).await;
            reply
        }
        Outcome::ReplyAndBroadcastAll { reply, push } => {
            broadcast(state, &Audience::All, &push, None).await;
            reply
        }
        Outcome::ReplyAndDirect { reply, push } => {
            send_to(state, client_id, push).await;
            reply
        }
        Outcome::ReplyAndBroadcastEach { reply, pushes } => {
            for (push, audience) in &pushes {
                broadcast(state, audience, push, Some(client_id)).await;
            }
            reply
        }
    };

    raw.request_id
        .as_deref()
        .and_then(|rid| encode_reply(rid, reply))
        .into_iter()
        .collect()
}

async fn handle_request(state: &AppState, client_id: &str, request: Request) -> Outcome {
    match request {
        Request::GetOne { collection, query } => handle_get_one(state, collection, query).await,
        Request::GetAll { collection, query } => handle_get_all(state, collection, query).await,
        Request::Update { collection, data } => handle_update(state, client_id, collection, data).await,
        Request::Remove { collection, id, diagram_id } => {
            handle_remove(state, client_id, collection, &id, diagram_id).await
        }
        Request::CreateInstance { collection, data } => handle_create(state, client_id, collection, data).await,
        Request::ClaimControl(claim) => handle_claim(state, client_id, &claim).await,
        Request::ReleaseControl(release) => handle_release(state, client_id, &release).await,
        Request::Subscribe { diagram_id } => handle_subscribe(state, client_id, &diagram_id).await,
        Request::PauseLiveMotion => handle_live_motion(state, client_id, false),
        Request::StartLiveMotion => handle_live_motion(state, client_id, true),
    }
}

// =============================================================================
// DOCUMENT HANDLERS
// =============================================================================

async fn handle_get_one(state: &AppState, collection: Collection, query: Data) -> Outcome {
    match document::get_one(state, collection, query).await {
        Ok(found) => Outcome::Reply(result_reply(found.map_or(Value::Null, Value::Object))),
        Err(e) => Outcome::Reply(read_failed(collection, &e)),
    }
}

async fn handle_get_all(state: &AppState, collection: Collection, query: Data) -> Outcome {
    match document::get_all(state, collection, query).await {
        Ok(docs) => Outcome::Reply(result_reply(Value::Array(docs.into_iter().map(Value::Object).collect()))),
        Err(e) => Outcome::Reply(read_failed(collection, &e)),
    }
}

async fn handle_update(state: &AppState, client_id: &str, collection: Collection, data: Data) -> Outcome {
    match document::update(state, collection, data).await {
        Ok(Some(updated)) => {
            let reply = flag_reply("updated", true);
            match updated.patch {
                Some(patch) => match patch.diagram_id.clone() {
                    Some(diagram_id) => Outcome::ReplyAndBroadcast {
                        reply,
                        push: Push::EntityUpdate(patch),
                        audience: Audience::Diagram(diagram_id),
                    },
                    None => Outcome::Reply(reply),
                },
                None => Outcome::Reply(reply),
            }
        }
        Ok(None) => Outcome::Reply(flag_reply("updated", false)),
        Err(e) => {
            warn!(%client_id, %collection, code = e.error_code(), error = %e, "ws: update failed");
            Outcome::Reply(failed_reply("updated", &e))
        }
    }
}

async fn handle_remove(
    state: &AppState,
    client_id: &str,
    collection: Collection,
    id: &str,
    diagram_id: Option<String>,
) -> Outcome {
    match document::remove(state, collection, id, diagram_id).await {
        Ok(Some(removed)) => {
            let reply = flag_reply("deleted", true);
            match (collection, removed.diagram_id.clone()) {
                (Collection::Entities, Some(diagram_id)) => Outcome::ReplyAndBroadcast {
                    reply,
                    push: Push::EntityRemove(removed),
                    audience: Audience::Diagram(diagram_id),
                },
                _ => Outcome::Reply(reply),
            }
        }
        Ok(None) => Outcome::Reply(flag_reply("deleted", false)),
        Err(e) => {
            warn!(%client_id, %collection, %id, code = e.error_code(), error = %e, "ws: remove failed");
            Outcome::Reply(failed_reply("deleted", &e))
        }
    }
}

async fn handle_create(state: &AppState, client_id: &str, collection: Collection, data: Data) -> Outcome {
    match document::create(state, collection, data).await {
        Ok(created) => {
            let mut reply = flag_reply("added", true);
            if let Some(id) = created.document.get("id") {
                reply.insert("id".into(), id.clone());
            }
            match created.entity {
                Some(record) => {
                    let audience = Audience::Diagram(record.diagram_id.clone());
                    Outcome::ReplyAndBroadcast { reply, push: Push::EntityAdd(record), audience }
                }
                None => Outcome::Reply(reply),
            }
        }
        Err(e) => {
            warn!(%client_id, %collection, code = e.error_code(), error = %e, "ws: create failed");
            Outcome::Reply(failed_reply("added", &e))
        }
    }
}

// =============================================================================
// CONTROL HANDLERS
// =============================================================================

async fn handle_claim(state: &AppState, client_id: &str, claim: &ControlClaim) -> Outcome {
    let outcome = control::claim(state, client_id, claim).await;
    let push = Push::EntityUpdate(outcome.patch());
    match outcome {
        ClaimOutcome::Accepted { key, controller_id, released } => {
            let mut pushes: Vec<(Push, Audience)> = released
                .iter()
                .map(|other| {
                    let release = Push::EntityUpdate(control::released_patch(other));
                    (release, Audience::Diagram(other.diagram_id.clone()))
                })
                .collect();
            pushes.push((push, Audience::Diagram(key.diagram_id.clone())));
            Outcome::ReplyAndBroadcastEach {
                reply: claim_reply(true, &key.id, &key.diagram_id, &controller_id),
                pushes,
            }
        }
        ClaimOutcome::Rejected { key, holder } => Outcome::ReplyAndDirect {
            reply: claim_reply(false, &key.id, &key.diagram_id, &holder),
            push,
        },
    }
}

async fn handle_release(state: &AppState, client_id: &str, release: &ControlRelease) -> Outcome {
    match control::release(state, client_id, release).await {
        Some(key) => Outcome::ReplyAndBroadcast {
            reply: flag_reply("released", true),
            push: Push::EntityUpdate(control::released_patch(&key)),
            audience: Audience::Diagram(key.diagram_id),
        },
        None => Outcome::Reply(flag_reply("released", false)),
    }
}

// =============================================================================
// SESSION HANDLERS
// =============================================================================

async fn handle_subscribe(state: &AppState, client_id: &str, diagram_id: &str) -> Outcome {
    if !state.subscribe(client_id, diagram_id).await {
        warn!(%client_id, %diagram_id, "ws: subscribe from unregistered connection");
    }

    match document::entities_in(state, diagram_id).await {
        Ok(records) => {
            let mut reply = flag_reply("subscribed", true);
            reply.insert("diagramId".into(), Value::String(diagram_id.to_owned()));
            reply.insert("result".into(), json!(records));
            info!(%client_id, %diagram_id, count = records.len(), "ws: subscribed");
            Outcome::Reply(reply)
        }
        Err(e) => {
            warn!(%client_id, %diagram_id, error = %e, "ws: subscribe snapshot failed");
            Outcome::Reply(failed_reply("subscribed", &e))
        }
    }
}

fn handle_live_motion(state: &AppState, client_id: &str, live: bool) -> Outcome {
    let previous = state.set_live(live);
    info!(%client_id, live, previous, "ws: live motion toggled");
    let mut reply = Data::new();
    reply.insert("live".into(), Value::Bool(live));
    Outcome::ReplyAndBroadcastAll { reply, push: Push::LiveMotion(LiveMotion { live }) }
}

// =============================================================================
// HELPERS
// =============================================================================

fn encode_reply(request_id: &str, body: Data) -> Option<String> {
    match frames::encode_reply(request_id, body) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(%request_id, error = %e, "ws: reply encode failed");
            None
        }
    }
}

/// Request id of a message that failed to decode, if it carried one.
fn salvage_request_id(text: &str) -> Option<String> {
    let Ok(Value::Object(body)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    body.get(frames::REQUEST_ID)
        .or_else(|| body.get(frames::REQUEST_ID_LEGACY))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn result_reply(result: Value) -> Data {
    let mut data = Data::new();
    data.insert("result".into(), result);
    data
}

fn read_failed(collection: Collection, err: &RequestError) -> Data {
    warn!(%collection, code = err.error_code(), error = %err, "ws: read failed");
    let mut data = error_reply(err);
    data.insert("result".into(), Value::Null);
    data
}

fn claim_reply(accepted: bool, id: &str, diagram_id: &str, controller_id: &str) -> Data {
    let mut data = flag_reply("accepted", accepted);
    data.insert("id".into(), Value::String(id.to_owned()));
    data.insert("diagramId".into(), Value::String(diagram_id.to_owned()));
    data.insert("controllerId".into(), Value::String(controller_id.to_owned()));
    data
}
