//! Sans-IO sync client: request correlation, push dispatch, and coalesced
//! outbound updates on top of the canvas engine.
//!
//! LIFECYCLE
//! =========
//!
//! `Closed -> Connecting -> Open -> Closed`. Sends while not `Open` are
//! logged and dropped; there is no send buffer and no automatic reconnect.
//! Closing resolves every pending waiter with [`ClientError::Closed`] and
//! rolls back provisional state: an in-flight control claim, an optimistic
//! create, or an optimistic remove.
//!
//! DISPATCH
//! ========
//!
//! Inbound text with a `requestId` is a reply: the matching pending entry is
//! removed, its [`ReplyAction`] applied, and its waiter resolved. Anything
//! else with a `type` is a push and goes through the exhaustive match in
//! [`SyncClient::handle_push`]. Unparseable or unknown messages are logged;
//! the connection stays open.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::time::{Duration, Instant};

use canvas::animate::Target;
use canvas::engine::{Action, EngineCore};
use canvas::input::EntityState;
use frames::{
    Collection, Data, EntityPatch, EntityRecord, Push, RawRequest, RequestKind, ServerMessage, decode_server_message,
    encode_request,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::coalesce::{CoalesceQueue, Outgoing};
use crate::pending::{PendingTable, Reply, ReplyAction, deliver};
use crate::{ANIMATION_FRAME, ClientConfig, ClientError};

/// Transport state as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// Notable state changes, for observers such as the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected { client_id: String },
    EntitiesLoaded { diagram_id: Option<String>, count: usize },
    EntityAdded { id: String },
    EntityUpdated { id: String },
    EntityRemoved { id: String },
    ControlResolved { id: String, accepted: bool },
    LiveMotion { live: bool },
    Closed,
}

/// Counters of outbound traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendStats {
    pub updates: usize,
    pub requests: usize,
    pub dropped: usize,
}

/// Client-side protocol state for one connection.
#[derive(Debug)]
pub struct SyncClient {
    config: ClientConfig,
    state: ConnectionState,
    outbox: Option<mpsc::UnboundedSender<String>>,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
    pending: PendingTable,
    queue: CoalesceQueue,
    diagram_id: Option<String>,
    live: bool,
    stats: SendStats,
    /// Next animation frame, while animations run.
    animation_due: Option<Instant>,
    pub engine: EngineCore,
}

impl SyncClient {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Closed,
            outbox: None,
            events: None,
            pending: PendingTable::new(),
            queue: CoalesceQueue::new(config.coalesce_window),
            diagram_id: None,
            live: true,
            stats: SendStats::default(),
            animation_due: None,
            engine: EngineCore::new(),
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Mark the transport open; `outbox` receives encoded messages in order.
    pub fn set_open(&mut self, outbox: mpsc::UnboundedSender<String>) {
        self.outbox = Some(outbox);
        self.state = ConnectionState::Open;
        info!("sync client open");
    }

    /// Mark the transport closed and fail everything in flight.
    pub fn set_closed(&mut self) {
        if self.state == ConnectionState::Closed && self.outbox.is_none() {
            return;
        }
        self.state = ConnectionState::Closed;
        self.outbox = None;
        self.queue.clear();
        for action in self.pending.fail_all() {
            self.roll_back(action);
        }
        self.emit(SyncEvent::Closed);
        info!("sync client closed");
    }

    /// Subscribe an observer to [`SyncEvent`]s.
    pub fn set_event_sink(&mut self, events: mpsc::UnboundedSender<SyncEvent>) {
        self.events = Some(events);
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn diagram_id(&self) -> Option<&str> {
        self.diagram_id.as_deref()
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.engine.control.client_id.as_deref()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live
    }

    #[must_use]
    pub fn stats(&self) -> SendStats {
        self.stats
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Earliest instant at which [`SyncClient::poll_at`] has work.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.queue.deadline(), self.pending.next_deadline(), self.animation_due]
            .into_iter()
            .flatten()
            .min()
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Encode and transmit a request as-is.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TransportNotOpen`] when not open (the message is
    /// dropped) and [`ClientError::Codec`] if encoding fails.
    pub fn send(&mut self, request: &RawRequest) -> Result<(), ClientError> {
        let Some(outbox) = self.outbox.as_ref().filter(|_| self.state == ConnectionState::Open) else {
            warn!(kind = %request.kind, "transport not open; dropping message");
            self.stats.dropped += 1;
            return Err(ClientError::TransportNotOpen);
        };
        let text = encode_request(request)?;
        if outbox.send(text).is_err() {
            warn!(kind = %request.kind, "outbox closed; dropping message");
            self.stats.dropped += 1;
            self.set_closed();
            return Err(ClientError::TransportNotOpen);
        }
        if request.kind == RequestKind::Update.as_str() {
            self.stats.updates += 1;
        } else {
            self.stats.requests += 1;
        }
        Ok(())
    }

    /// Send a request that expects a reply. The returned receiver resolves
    /// with the reply body, a rejection, a timeout, or `Closed`.
    ///
    /// # Errors
    ///
    /// Fails like [`SyncClient::send`]; nothing is registered in that case.
    pub fn request_at(
        &mut self,
        kind: RequestKind,
        collection: Option<Collection>,
        data: Data,
        action: ReplyAction,
        now: Instant,
    ) -> Result<oneshot::Receiver<Reply>, ClientError> {
        let mut request = RawRequest::new(kind, collection, data);
        let mut request_id = request.assign_request_id();
        while self.pending.contains(&request_id) {
            request_id = request.assign_request_id();
        }
        self.send(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .insert(request_id, Some(tx), action, now + self.config.request_timeout);
        Ok(rx)
    }

    /// Queue an update through the coalescing window.
    pub fn enqueue_update_at(&mut self, collection: Collection, patch: Data, now: Instant) {
        if let Some(out) = self.queue.enqueue_at(collection, patch, now) {
            self.send_update(out);
        }
    }

    fn send_update(&mut self, out: Outgoing) {
        let request = RawRequest::new(RequestKind::Update, Some(out.collection), out.patch);
        if let Err(e) = self.send(&request) {
            debug!(error = %e, "update not sent");
        }
    }

    /// Advance due animations, flush due coalesced updates, and expire
    /// overdue requests.
    pub fn poll_at(&mut self, now: Instant) {
        if self.animation_due.is_some_and(|due| due <= now) {
            self.step_animations_at(now);
        }
        for out in self.queue.poll_at(now) {
            self.send_update(out);
        }
        for action in self.pending.expire_at(now) {
            self.roll_back(action);
        }
    }

    /// Glide an entity toward `target`. Every frame's position goes through
    /// the coalescing queue like a drag. Remotely controlled entities do not
    /// animate.
    pub fn animate_entity_at(&mut self, id: &str, target: Target, duration: Duration, now: Instant) -> bool {
        if self.engine.state_of(id).is_none_or(|s| s == EntityState::ControlledRemote) {
            return false;
        }
        if !self.engine.animate_to_at(id, target, duration, now) {
            return false;
        }
        self.animation_due = Some(now);
        true
    }

    fn step_animations_at(&mut self, now: Instant) {
        let touched = self.engine.step_animations_at(now);
        let actions: Vec<Action> = touched
            .iter()
            .filter_map(|id| self.engine.entity(id))
            .map(|e| {
                Action::Update(
                    EntityPatch::new(e.id())
                        .with_diagram(e.diagram_id())
                        .with_position(e.record.pos_x, e.record.pos_y)
                        .with_angle(e.record.angle),
                )
            })
            .collect();
        self.apply_actions_at(actions, now);
        self.animation_due = self.engine.animator.is_animating().then(|| now + ANIMATION_FRAME);
    }

    /// Send whatever the engine asked for.
    pub fn apply_actions_at(&mut self, actions: Vec<Action>, now: Instant) {
        for action in actions {
            match action {
                Action::Update(patch) => match patch.to_data() {
                    Ok(data) => self.enqueue_update_at(Collection::Entities, data, now),
                    Err(e) => warn!(id = %patch.id, error = %e, "unencodable patch"),
                },
                Action::ClaimControl { id, diagram_id } => {
                    let data = control_data(&id, &diagram_id);
                    if let Err(e) = self.request_at(RequestKind::ConnectPlayer, None, data, ReplyAction::Claim { id: id.clone() }, now) {
                        warn!(%id, error = %e, "control claim not sent");
                        self.engine.confirm_claim(&id, false, None);
                    }
                }
                Action::ReleaseControl { id, diagram_id } => {
                    let data = control_data(&id, &diagram_id);
                    if let Err(e) = self.request_at(RequestKind::QuitPlayer, None, data, ReplyAction::Release { id: id.clone() }, now) {
                        warn!(%id, error = %e, "control release not sent");
                    }
                }
            }
        }
    }

    // --- Convenience requests ---

    /// Subscribe to a diagram; the reply replaces the local entity list.
    ///
    /// # Errors
    ///
    /// Fails like [`SyncClient::send`].
    pub fn subscribe_at(&mut self, diagram_id: &str, now: Instant) -> Result<oneshot::Receiver<Reply>, ClientError> {
        let mut data = Data::new();
        data.insert("diagramId".into(), Value::String(diagram_id.to_owned()));
        let action = ReplyAction::Subscribe { diagram_id: diagram_id.to_owned() };
        self.request_at(RequestKind::Subscribe, None, data, action, now)
    }

    /// Create an entity. A missing id is assigned here so the record can be
    /// added to the local store once the request is sent. A rejected,
    /// timed-out, or closed request restores the prior local state.
    ///
    /// # Errors
    ///
    /// Fails like [`SyncClient::send`], or if the record cannot be encoded.
    /// Local state is untouched in that case.
    pub fn create_entity_at(&mut self, mut record: EntityRecord, now: Instant) -> Result<oneshot::Receiver<Reply>, ClientError> {
        if record.id.is_empty() {
            record.id = frames::unique_id();
        }
        let data = record.to_data()?;
        let previous = self.engine.entity(&record.id).map(|e| Box::new(e.record.clone()));
        let action = ReplyAction::Create { id: record.id.clone(), previous };
        let rx = self.request_at(RequestKind::CreateInstance, Some(Collection::Entities), data, action, now)?;
        self.engine.apply_add(record);
        Ok(rx)
    }

    /// Remove an entity on the server, and locally once the request is sent.
    /// A rejected, timed-out, or closed request puts the entity back.
    ///
    /// # Errors
    ///
    /// Fails like [`SyncClient::send`]. Local state is untouched in that case.
    pub fn remove_entity_at(&mut self, id: &str, now: Instant) -> Result<oneshot::Receiver<Reply>, ClientError> {
        let record = self.engine.entity(id).map(|e| e.record.clone());
        let mut data = Data::new();
        data.insert("id".into(), Value::String(id.to_owned()));
        if let Some(record) = &record {
            data.insert("diagramId".into(), Value::String(record.diagram_id.clone()));
        }
        let action = match record {
            Some(record) => ReplyAction::Remove { record: Box::new(record) },
            None => ReplyAction::None,
        };
        let rx = self.request_at(RequestKind::Remove, Some(Collection::Entities), data, action, now)?;
        self.engine.apply_remove(id);
        Ok(rx)
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Handle one inbound text message.
    pub fn handle_text(&mut self, text: &str) {
        match decode_server_message(text) {
            Ok(ServerMessage::Reply { request_id, body }) => self.handle_reply(&request_id, body),
            Ok(ServerMessage::Push(push)) => self.handle_push(push),
            Err(e) => warn!(error = %e, "ignoring inbound message"),
        }
    }

    fn handle_reply(&mut self, request_id: &str, body: Data) {
        let Some((action, waiter)) = self.pending.take(request_id) else {
            debug!(%request_id, "reply for unknown request");
            return;
        };

        if let Some(rejection) = rejection(&body) {
            debug!(%request_id, error = %rejection, "request rejected");
            self.roll_back(action);
            deliver(waiter, Err(rejection));
            return;
        }

        match &action {
            ReplyAction::None
            | ReplyAction::Release { .. }
            | ReplyAction::Create { .. }
            | ReplyAction::Remove { .. } => {}
            ReplyAction::Claim { id } => {
                let accepted = body.get("accepted").and_then(Value::as_bool).unwrap_or(false);
                let controller = body.get("controllerId").and_then(Value::as_str).map(str::to_owned);
                self.engine.confirm_claim(id, accepted, controller);
                self.emit(SyncEvent::ControlResolved { id: id.clone(), accepted });
            }
            ReplyAction::Subscribe { diagram_id } => {
                let records = body
                    .get("result")
                    .cloned()
                    .map(serde_json::from_value::<Vec<EntityRecord>>)
                    .transpose();
                match records {
                    Ok(records) => {
                        self.diagram_id = Some(diagram_id.clone());
                        self.load(Some(diagram_id.clone()), records.unwrap_or_default());
                    }
                    Err(e) => warn!(%diagram_id, error = %e, "malformed subscribe result"),
                }
            }
        }
        deliver(waiter, Ok(body));
    }

    /// Apply a server push to local state.
    pub fn handle_push(&mut self, push: Push) {
        debug!(kind = push.kind(), "push");
        match push {
            Push::Connected(welcome) => {
                self.engine.set_client_id(welcome.client_id.clone());
                self.emit(SyncEvent::Connected { client_id: welcome.client_id });
            }
            Push::EntitiesSet(records) => {
                let diagram_id = records.first().map(|r| r.diagram_id.clone());
                self.load(diagram_id, records);
            }
            Push::EntityAdd(record) => {
                let id = record.id.clone();
                self.engine.apply_add(record);
                self.emit(SyncEvent::EntityAdded { id });
            }
            Push::EntityUpdate(patch) => self.apply_update(&patch),
            Push::UpdateEntities(patches) => {
                for patch in &patches {
                    self.apply_update(patch);
                }
            }
            Push::EntityRemove(target) => {
                self.engine.apply_remove(&target.id);
                self.emit(SyncEvent::EntityRemoved { id: target.id });
            }
            Push::LiveMotion(motion) => {
                self.live = motion.live;
                self.emit(SyncEvent::LiveMotion { live: motion.live });
            }
        }
    }

    fn apply_update(&mut self, patch: &EntityPatch) {
        if self.engine.apply_update(patch).is_some() {
            self.emit(SyncEvent::EntityUpdated { id: patch.id.clone() });
        }
    }

    fn load(&mut self, diagram_id: Option<String>, records: Vec<EntityRecord>) {
        self.engine.load_entities(records);
        let count = self.engine.store.len();
        self.emit(SyncEvent::EntitiesLoaded { diagram_id, count });
    }

    /// Undo provisional state for a request that failed.
    fn roll_back(&mut self, action: ReplyAction) {
        match action {
            ReplyAction::Claim { id } => {
                self.engine.confirm_claim(&id, false, None);
                self.emit(SyncEvent::ControlResolved { id, accepted: false });
            }
            ReplyAction::Create { id, previous: Some(previous) } => {
                info!(%id, "create failed; restoring previous record");
                self.engine.apply_add(*previous);
                self.emit(SyncEvent::EntityUpdated { id });
            }
            ReplyAction::Create { id, previous: None } => {
                info!(%id, "create failed; dropping local entity");
                self.engine.apply_remove(&id);
                self.emit(SyncEvent::EntityRemoved { id });
            }
            ReplyAction::Remove { record } => {
                info!(id = %record.id, "remove failed; restoring entity");
                let id = record.id.clone();
                self.engine.apply_add(*record);
                self.emit(SyncEvent::EntityAdded { id });
            }
            ReplyAction::None | ReplyAction::Release { .. } | ReplyAction::Subscribe { .. } => {}
        }
    }

    fn emit(&mut self, event: SyncEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                self.events = None;
            }
        }
    }
}

fn control_data(id: &str, diagram_id: &str) -> Data {
    let mut data = Data::new();
    data.insert("id".into(), Value::String(id.to_owned()));
    data.insert("diagramId".into(), Value::String(diagram_id.to_owned()));
    data
}

/// Error carried by a reply body, if any.
///
/// Accepts the structured `{error: {code, message}}` form and the bare
/// best-effort `{error: "..."}` form.
fn rejection(body: &Data) -> Option<ClientError> {
    match body.get("error")? {
        Value::Object(err) => Some(ClientError::Rejected {
            code: err.get("code").and_then(Value::as_str).unwrap_or("E_UNKNOWN").to_owned(),
            message: err.get("message").and_then(Value::as_str).unwrap_or_default().to_owned(),
        }),
        Value::String(message) => Some(ClientError::Rejected { code: "E_UNKNOWN".into(), message: message.clone() }),
        Value::Null => None,
        other => Some(ClientError::Rejected { code: "E_UNKNOWN".into(), message: other.to_string() }),
    }
}
