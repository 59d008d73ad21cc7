//! `FrontSeat` sync server.
//!
//! SYSTEM CONTEXT
//! ==============
//! Browser and CLI clients connect over `/ws`, subscribe to a diagram, and
//! exchange typed requests and pushes (see the `frames` crate). The server
//! executes each request against a [`store::DocumentStore`], keeps the control
//! registry, and fans changes out to the other connections on the same
//! diagram. Motion-tracker feeds connect over `/motion` and move controlled
//! entities through the same broadcast path.

pub mod config;
pub mod db;
pub mod frame;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
