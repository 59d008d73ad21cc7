//! Entity record and the whitelisted partial update applied to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Data, ProtocolError};

/// Plain document shape of a diagram entity as stored and transmitted.
///
/// `drawType`, `name` and `color` default to empty so minimal records (id,
/// diagram, class, geometry) are accepted; an empty `drawType` resolves to the
/// record's `class` when a renderer is looked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "diagramID")]
    pub diagram_id: String,
    pub class: String,
    #[serde(default)]
    pub draw_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color2: Option<String>,
    #[serde(default)]
    pub pos_x: f64,
    #[serde(default)]
    pub pos_y: f64,
    #[serde(default = "default_size")]
    pub size: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub has_controller: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<String>,
}

fn default_size() -> f64 {
    1.0
}

impl EntityRecord {
    /// Minimal record with geometry at the origin.
    #[must_use]
    pub fn new(id: impl Into<String>, diagram_id: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            diagram_id: diagram_id.into(),
            class: class.into(),
            draw_type: String::new(),
            name: String::new(),
            color: String::new(),
            color2: None,
            pos_x: 0.0,
            pos_y: 0.0,
            size: default_size(),
            angle: 0.0,
            has_controller: false,
            controller_id: None,
        }
    }

    /// Renderer key: `drawType`, falling back to `class` when unset.
    #[must_use]
    pub fn draw_key(&self) -> &str {
        if self.draw_type.is_empty() { &self.class } else { &self.draw_type }
    }

    /// Merge every field present in `patch` into this record.
    ///
    /// Returns `true` if a projected attribute (`posX`, `posY`, `size`,
    /// `angle`) changed.
    pub fn apply(&mut self, patch: &EntityPatch) -> bool {
        let mut moved = false;
        if let Some(v) = &patch.diagram_id {
            self.diagram_id.clone_from(v);
        }
        if let Some(v) = &patch.class {
            self.class.clone_from(v);
        }
        if let Some(v) = &patch.draw_type {
            self.draw_type.clone_from(v);
        }
        if let Some(v) = &patch.name {
            self.name.clone_from(v);
        }
        if let Some(v) = &patch.color {
            self.color.clone_from(v);
        }
        if let Some(v) = &patch.color2 {
            self.color2 = Some(v.clone());
        }
        for (slot, value) in [
            (&mut self.pos_x, patch.pos_x),
            (&mut self.pos_y, patch.pos_y),
            (&mut self.size, patch.size),
            (&mut self.angle, patch.angle),
        ] {
            if let Some(v) = value {
                moved |= (*slot - v).abs() > f64::EPSILON;
                *slot = v;
            }
        }
        if let Some(v) = patch.has_controller {
            self.has_controller = v;
            if !v {
                self.controller_id = None;
            }
        }
        if patch.controller_id.is_some() {
            self.controller_id.clone_from(&patch.controller_id);
        }
        moved
    }

    /// Serialize to a flat JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPayload`] if a float is not finite.
    pub fn to_data(&self) -> Result<Data, ProtocolError> {
        to_object(self)
    }

    /// Parse a record from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPayload`] when required fields are
    /// missing or mistyped.
    pub fn from_data(data: &Data) -> Result<Self, ProtocolError> {
        serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
    }
}

/// Partial entity update restricted to the mutable field whitelist.
///
/// Unknown fields fail deserialization instead of being merged into the
/// record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityPatch {
    pub id: String,
    #[serde(default, alias = "diagramID", skip_serializing_if = "Option::is_none")]
    pub diagram_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<String>,
}

impl EntityPatch {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_diagram(mut self, diagram_id: impl Into<String>) -> Self {
        self.diagram_id = Some(diagram_id.into());
        self
    }

    #[must_use]
    pub fn with_position(mut self, pos_x: f64, pos_y: f64) -> Self {
        self.pos_x = Some(pos_x);
        self.pos_y = Some(pos_y);
        self
    }

    #[must_use]
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = Some(angle);
        self
    }

    /// Control fields as the server broadcasts them.
    #[must_use]
    pub fn with_controller(mut self, controller_id: Option<String>) -> Self {
        self.has_controller = Some(controller_id.is_some());
        self.controller_id = controller_id;
        self
    }

    /// Whether the patch touches a field that affects the screen projection.
    #[must_use]
    pub fn touches_projection(&self) -> bool {
        self.pos_x.is_some() || self.pos_y.is_some() || self.size.is_some() || self.angle.is_some()
    }

    /// Whether the patch sets any field besides its `id` and `diagramId`.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.class.is_some()
            || self.draw_type.is_some()
            || self.name.is_some()
            || self.color.is_some()
            || self.color2.is_some()
            || self.touches_projection()
            || self.has_controller.is_some()
            || self.controller_id.is_some()
    }

    /// Drop control fields. Only the control verbs may change them.
    pub fn strip_control(&mut self) {
        self.has_controller = None;
        self.controller_id = None;
    }

    /// Parse and validate a patch against the whitelist.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPayload`] for unknown fields, a missing
    /// `id`, or mistyped values.
    pub fn from_data(data: &Data) -> Result<Self, ProtocolError> {
        serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
    }

    /// Serialize to a flat JSON object containing only the set fields.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPayload`] if a float is not finite.
    pub fn to_data(&self) -> Result<Data, ProtocolError> {
        to_object(self)
    }
}

/// Identity of an entity inside a diagram, as carried by `entity_remove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub id: String,
    #[serde(default, alias = "diagramID", skip_serializing_if = "Option::is_none")]
    pub diagram_id: Option<String>,
}

fn to_object<T: Serialize>(value: &T) -> Result<Data, ProtocolError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProtocolError::InvalidPayload(format!("expected object, got {other}"))),
        Err(e) => Err(ProtocolError::InvalidPayload(e.to_string())),
    }
}
