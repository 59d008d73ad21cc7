//! Reply bodies and structured errors.
//!
//! DESIGN
//! ======
//! A reply is a flat JSON object tagged with the request's `requestId`.
//! Failures travel inside the same object under `error` so the requester's
//! waiter always resolves:
//!
//! ```text
//! { "updated": false, "error": { "code": "E_STORE", "message": "...", "retryable": true }, "requestId": "..." }
//! ```

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;

use frames::Data;
use serde_json::Value;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Reply key carrying a structured error.
pub const FRAME_ERROR: &str = "error";

/// Error key for the grepable code.
pub const FRAME_CODE: &str = "code";

/// Error key for the human-readable message.
pub const FRAME_MESSAGE: &str = "message";

/// Error key for the retryable flag.
pub const FRAME_RETRYABLE: &str = "retryable";

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error replies.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

/// `{code, message, retryable}` for a typed error.
#[must_use]
pub fn error_object(err: &(impl ErrorCode + ?Sized)) -> Data {
    let mut data = Data::new();
    data.insert(FRAME_CODE.into(), Value::String(err.error_code().to_owned()));
    data.insert(FRAME_MESSAGE.into(), Value::String(err.to_string()));
    data.insert(FRAME_RETRYABLE.into(), Value::Bool(err.retryable()));
    data
}

/// Reply body carrying only an error.
#[must_use]
pub fn error_reply(err: &(impl ErrorCode + ?Sized)) -> Data {
    let mut data = Data::new();
    data.insert(FRAME_ERROR.into(), Value::Object(error_object(err)));
    data
}

/// Best-effort reply: the verb's result flag set to `false`, plus the error.
#[must_use]
pub fn failed_reply(flag: &str, err: &(impl ErrorCode + ?Sized)) -> Data {
    let mut data = error_reply(err);
    data.insert(flag.to_owned(), Value::Bool(false));
    data
}

/// Single-key reply body such as `{added: true}`.
#[must_use]
pub fn flag_reply(flag: &str, value: bool) -> Data {
    let mut data = Data::new();
    data.insert(flag.to_owned(), Value::Bool(value));
    data
}
