//! Request envelope and its typed interpretation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Data, ProtocolError, unique_id};

/// Document kinds addressable by CRUD verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Entities,
    Diagrams,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Users, Collection::Entities, Collection::Diagrams];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Entities => "entities",
            Self::Diagrams => "diagrams",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCollection(s.to_owned()))
    }
}

/// Request verbs understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    GetOne,
    GetAll,
    Update,
    Remove,
    CreateInstance,
    NewPlayer,
    ConnectPlayer,
    QuitPlayer,
    PauseLiveMotion,
    StartLiveMotion,
    Subscribe,
}

impl RequestKind {
    pub const ALL: [RequestKind; 11] = [
        RequestKind::GetOne,
        RequestKind::GetAll,
        RequestKind::Update,
        RequestKind::Remove,
        RequestKind::CreateInstance,
        RequestKind::NewPlayer,
        RequestKind::ConnectPlayer,
        RequestKind::QuitPlayer,
        RequestKind::PauseLiveMotion,
        RequestKind::StartLiveMotion,
        RequestKind::Subscribe,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetOne => "getOne",
            Self::GetAll => "getAll",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::CreateInstance => "createInstance",
            Self::NewPlayer => "newPlayer",
            Self::ConnectPlayer => "connectPlayer",
            Self::QuitPlayer => "quitPlayer",
            Self::PauseLiveMotion => "pauseLiveMotion",
            Self::StartLiveMotion => "startLiveMotion",
            Self::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownType(s.to_owned()))
    }
}

/// Request exactly as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default, alias = "requestID", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Data::new())
}

impl RawRequest {
    /// Fire-and-forget request with no correlation id.
    #[must_use]
    pub fn new(kind: RequestKind, collection: Option<Collection>, data: Data) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            collection: collection.map(|c| c.as_str().to_owned()),
            data: Value::Object(data),
            request_id: None,
        }
    }

    /// Attach a freshly generated request id and return it.
    pub fn assign_request_id(&mut self) -> String {
        let id = unique_id();
        self.request_id = Some(id.clone());
        id
    }
}

/// Control claim payload for `newPlayer` / `connectPlayer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlClaim {
    pub id: String,
    #[serde(default, alias = "diagramID", skip_serializing_if = "Option::is_none")]
    pub diagram_id: Option<String>,
}

/// Control release payload for `quitPlayer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRelease {
    pub id: String,
    #[serde(default, alias = "diagramID", skip_serializing_if = "Option::is_none")]
    pub diagram_id: Option<String>,
}

/// Typed request. The server dispatches on this exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetOne { collection: Collection, query: Data },
    GetAll { collection: Collection, query: Data },
    Update { collection: Collection, data: Data },
    Remove { collection: Collection, id: String, diagram_id: Option<String> },
    CreateInstance { collection: Collection, data: Data },
    ClaimControl(ControlClaim),
    ReleaseControl(ControlRelease),
    Subscribe { diagram_id: String },
    PauseLiveMotion,
    StartLiveMotion,
}

impl Request {
    /// Interpret a wire envelope.
    ///
    /// CRUD verbs require a registered `collection`; control, subscription and
    /// live-motion verbs ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] for an unknown verb, an unknown or missing
    /// collection, or a payload that does not match the verb.
    pub fn from_raw(raw: &RawRequest) -> Result<Self, ProtocolError> {
        let kind: RequestKind = raw.kind.parse()?;
        let data = match &raw.data {
            Value::Object(map) => map.clone(),
            Value::Null => Data::new(),
            other => {
                return Err(ProtocolError::InvalidPayload(format!("data must be an object, got {other}")));
            }
        };

        let collection = || -> Result<Collection, ProtocolError> {
            raw.collection
                .as_deref()
                .ok_or_else(|| ProtocolError::UnknownCollection(String::new()))?
                .parse()
        };

        Ok(match kind {
            RequestKind::GetOne => Self::GetOne { collection: collection()?, query: data },
            RequestKind::GetAll => Self::GetAll { collection: collection()?, query: data },
            RequestKind::Update => Self::Update { collection: collection()?, data },
            RequestKind::CreateInstance => Self::CreateInstance { collection: collection()?, data },
            RequestKind::Remove => {
                let collection = collection()?;
                let id = string_field(&data, "id")?.ok_or(ProtocolError::MissingField("id"))?;
                let diagram_id = diagram_field(&data)?;
                Self::Remove { collection, id, diagram_id }
            }
            RequestKind::NewPlayer | RequestKind::ConnectPlayer => Self::ClaimControl(payload(data)?),
            RequestKind::QuitPlayer => Self::ReleaseControl(payload(data)?),
            RequestKind::Subscribe => {
                let diagram_id = diagram_field(&data)?.ok_or(ProtocolError::MissingField("diagramId"))?;
                Self::Subscribe { diagram_id }
            }
            RequestKind::PauseLiveMotion => Self::PauseLiveMotion,
            RequestKind::StartLiveMotion => Self::StartLiveMotion,
        })
    }
}

fn payload<T: serde::de::DeserializeOwned>(data: Data) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(data)).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}

fn string_field(data: &Data, key: &'static str) -> Result<Option<String>, ProtocolError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(ProtocolError::InvalidPayload(format!("`{key}` must be a string, got {other}"))),
    }
}

/// `diagramId`, accepting the legacy `diagramID` spelling.
fn diagram_field(data: &Data) -> Result<Option<String>, ProtocolError> {
    match string_field(data, "diagramId")? {
        Some(id) => Ok(Some(id)),
        None => string_field(data, "diagramID"),
    }
}
