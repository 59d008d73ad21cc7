//! Request execution against shared state.
//!
//! Services validate input, mutate the store and registries, and return typed
//! results. They never talk to sockets; the route layer turns results into
//! replies and pushes and hands pushes to [`broadcast`].

pub mod broadcast;
pub mod control;
pub mod document;
pub mod motion;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use frames::ProtocolError;

use crate::frame::ErrorCode;
use crate::store::StoreError;

/// Reasons a single request fails. None of them close the connection.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// An entity patch carried a field outside the whitelist, or a mistyped
    /// value.
    #[error("invalid field: {0}")]
    InvalidField(String),
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl ErrorCode for RequestError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Protocol(ProtocolError::UnknownType(_)) => "E_UNKNOWN_TYPE",
            Self::Protocol(ProtocolError::UnknownCollection(_)) => "E_UNKNOWN_COLLECTION",
            Self::Protocol(ProtocolError::MissingField(_)) => "E_MISSING_FIELD",
            Self::Protocol(ProtocolError::InvalidPayload(_)) => "E_INVALID_PAYLOAD",
            Self::InvalidField(_) => "E_INVALID_FIELD",
            Self::Store(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.retryable(),
            _ => false,
        }
    }
}
