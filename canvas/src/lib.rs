//! Diagram state and input engine for the blocking canvas.
//!
//! This crate owns everything a client needs to hold a live copy of a diagram:
//! the stage/screen coordinate transform, the entity store with its derived
//! screen projections, the selection and control state machine, renderer
//! lookup, and animation interpolation. It performs no I/O. Mutations that
//! must reach the server come back from the engine as [`engine::Action`]s; the
//! sync client decides how to send them.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Testable [`engine::EngineCore`] tying store, input, and control together |
//! | [`doc`] | Entity wrapper and the in-memory [`doc::EntityStore`] |
//! | [`camera`] | Viewport pan/zoom and stage/screen conversions |
//! | [`input`] | Pointer gesture state and per-entity [`input::EntityState`] |
//! | [`hit`] | Circle hit-testing in screen space |
//! | [`render`] | Drawing surface trait and `drawType` renderer registry |
//! | [`animate`] | Time-based interpolation of entity position and angle |
//! | [`consts`] | Shared numeric constants (scale limits, colours, shape ratios) |

pub mod animate;
pub mod camera;
pub mod consts;
pub mod doc;
pub mod engine;
pub mod hit;
pub mod input;
pub mod render;
