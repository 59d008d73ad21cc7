//! Shared wire model and JSON codec for the realtime diagram protocol.
//!
//! This crate owns the message shapes exchanged by the `frontseat` server and
//! the sync client. Every message is a JSON object on a text WebSocket frame:
//!
//! ```text
//! Request:  { type, collection?, data, requestId? }
//! Response: { ...result fields, requestId }
//! Push:     { type, data }
//! ```
//!
//! Requests are decoded in two steps: [`RawRequest`] mirrors the envelope
//! exactly, then [`Request::from_raw`] turns it into a typed variant so the
//! server dispatches on an exhaustive enum rather than a string table.

mod entity;
mod push;
mod request;

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

pub use entity::{EntityPatch, EntityRecord, EntityRef};
pub use push::{LiveMotion, Push, Welcome};
pub use request::{Collection, ControlClaim, ControlRelease, RawRequest, Request, RequestKind};

/// Flat JSON object payload. Alias to reduce noise in signatures.
pub type Data = Map<String, Value>;

/// Wire key carrying the request/response correlation id.
pub const REQUEST_ID: &str = "requestId";

/// Legacy spelling of [`REQUEST_ID`] still accepted on input.
pub const REQUEST_ID_LEGACY: &str = "requestID";

/// Error returned by the codec functions.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text was not valid JSON or did not match the expected shape.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// The top-level JSON value was not an object.
    #[error("message is not a JSON object")]
    NotAnObject,
    /// A push message named a `type` this protocol does not define.
    #[error("unknown push type: {0}")]
    UnknownPushType(String),
    /// The message carried neither a `requestId` nor a `type`.
    #[error("message has neither requestId nor type")]
    Unclassified,
}

/// Error raised while interpreting a decoded request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// `type` is not one of the request verbs.
    #[error("unknown request type: {0}")]
    UnknownType(String),
    /// `collection` is missing or not in the registry.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    /// A required `data` field was absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// `data` did not match the shape the verb expects.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// A message received by a client, classified by the inbound dispatch rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Correlated response to an earlier request. `body` excludes the id.
    Reply { request_id: String, body: Data },
    /// Server-initiated message.
    Push(Push),
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode a request envelope as JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_request(request: &RawRequest) -> Result<String, CodecError> {
    Ok(serde_json::to_string(request)?)
}

/// Decode JSON text into a request envelope.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed text or a missing `type`.
pub fn decode_request(text: &str) -> Result<RawRequest, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a push message as JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_push(push: &Push) -> Result<String, CodecError> {
    Ok(serde_json::to_string(push)?)
}

/// Encode a reply body tagged with its request id.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_reply(request_id: &str, mut body: Data) -> Result<String, CodecError> {
    body.insert(REQUEST_ID.into(), Value::String(request_id.to_owned()));
    Ok(serde_json::to_string(&body)?)
}

/// Classify an inbound client-side message as a reply or a push.
///
/// A `requestId` wins over `type`: replies may echo a `type` field.
///
/// # Errors
///
/// Returns [`CodecError::UnknownPushType`] for an unrecognised push `type`,
/// and [`CodecError::Unclassified`] when neither key is present.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, CodecError> {
    let Value::Object(mut body) = serde_json::from_str::<Value>(text)? else {
        return Err(CodecError::NotAnObject);
    };

    let request_id = body
        .remove(REQUEST_ID)
        .or_else(|| body.remove(REQUEST_ID_LEGACY));
    if let Some(Value::String(request_id)) = request_id {
        return Ok(ServerMessage::Reply { request_id, body });
    }

    let Some(kind) = body.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return Err(CodecError::Unclassified);
    };
    if !Push::KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(CodecError::UnknownPushType(kind));
    }
    Ok(ServerMessage::Push(serde_json::from_value(Value::Object(body))?))
}

// =============================================================================
// IDS
// =============================================================================

/// Generate a collision-resistant identifier: hex milliseconds, a dash, and a
/// random 32-bit hex suffix. Not cryptographically secure.
#[must_use]
pub fn unique_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let suffix: u32 = rand::random();
    format!("{millis:x}-{suffix:x}")
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
