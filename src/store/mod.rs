//! Document store seam.
//!
//! DESIGN
//! ======
//! The server treats persistence as an opaque keyed document store reached
//! through five verbs. Documents are flat JSON objects; a document is
//! addressed by its `id` and, for entities, its `diagramId`. Queries match
//! documents whose fields equal every field in the query object.
//!
//! Two implementations ship: [`MemoryStore`] (the default, and the one tests
//! use) and [`PgStore`] (one JSONB table in Postgres).

pub mod memory;
pub mod postgres;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use async_trait::async_trait;
use frames::{Collection, Data};
use serde_json::Value;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::frame::ErrorCode;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} document already exists: {id}")]
    Duplicate { collection: Collection, id: String },
    #[error("stored document is not an object: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Duplicate { .. } => "E_DUPLICATE_ID",
            Self::Corrupt(_) => "E_CORRUPT_DOCUMENT",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

/// Address of one document. `diagram_id` narrows the match when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocKey {
    pub id: String,
    pub diagram_id: Option<String>,
}

impl DocKey {
    #[must_use]
    pub fn new(id: impl Into<String>, diagram_id: Option<String>) -> Self {
        Self { id: id.into(), diagram_id }
    }

    /// Key of an existing document, if it carries a string `id`.
    #[must_use]
    pub fn of(doc: &Data) -> Option<Self> {
        let id = doc.get("id").and_then(Value::as_str)?;
        Some(Self::new(id, diagram_of(doc).map(str::to_owned)))
    }

    #[must_use]
    pub fn matches(&self, doc: &Data) -> bool {
        doc.get("id").and_then(Value::as_str) == Some(self.id.as_str())
            && self
                .diagram_id
                .as_deref()
                .is_none_or(|d| diagram_of(doc) == Some(d))
    }
}

/// Async document store keyed by collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `query`.
    async fn find_one(&self, collection: Collection, query: &Data) -> Result<Option<Data>, StoreError>;

    /// Every document matching `query`, oldest first.
    async fn find_all(&self, collection: Collection, query: &Data) -> Result<Vec<Data>, StoreError>;

    /// Merge `patch` into the addressed document. Returns the merged document,
    /// or `None` when nothing matched.
    async fn update_one(&self, collection: Collection, key: &DocKey, patch: &Data) -> Result<Option<Data>, StoreError>;

    /// Delete the addressed document. Returns it, or `None` when nothing
    /// matched.
    async fn delete_one(&self, collection: Collection, key: &DocKey) -> Result<Option<Data>, StoreError>;

    /// Insert a document, assigning an `id` when it has none.
    async fn create(&self, collection: Collection, record: Data) -> Result<Data, StoreError>;
}

// =============================================================================
// HELPERS
// =============================================================================

/// `diagramId` of a document, accepting the legacy spelling.
#[must_use]
pub fn diagram_of(doc: &Data) -> Option<&str> {
    doc.get("diagramId")
        .or_else(|| doc.get("diagramID"))
        .and_then(Value::as_str)
}

/// Whether every field of `query` equals the same field of `doc`.
#[must_use]
pub fn matches_query(doc: &Data, query: &Data) -> bool {
    query.iter().all(|(key, want)| doc.get(key) == Some(want))
}

/// Ensure `record` has a string `id`, generating one when missing.
pub fn ensure_id(record: &mut Data) -> String {
    if let Some(id) = record.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) {
        return id.to_owned();
    }
    let id = frames::unique_id();
    record.insert("id".into(), Value::String(id.clone()));
    id
}
