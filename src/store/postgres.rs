//! Postgres document store.
//!
//! DESIGN
//! ======
//! One `documents` table holds every collection. The primary key is
//! `(collection, id, diagram_id)`, with an empty `diagram_id` for documents
//! outside a diagram. The body is JSONB; queries use containment (`@>`), which
//! is field-equality matching for flat objects.

use async_trait::async_trait;
use frames::{Collection, Data};
use serde_json::Value;
use sqlx::PgPool;

use super::{DocKey, DocumentStore, StoreError, diagram_of, ensure_id};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_one(&self, collection: Collection, query: &Data) -> Result<Option<Data>, StoreError> {
        let body = sqlx::query_scalar::<_, Value>(
            "SELECT body FROM documents WHERE collection = $1 AND body @> $2 ORDER BY created_at, id LIMIT 1",
        )
        .bind(collection.as_str())
        .bind(Value::Object(query.clone()))
        .fetch_optional(&self.pool)
        .await?;
        body.map(into_object).transpose()
    }

    async fn find_all(&self, collection: Collection, query: &Data) -> Result<Vec<Data>, StoreError> {
        let bodies = sqlx::query_scalar::<_, Value>(
            "SELECT body FROM documents WHERE collection = $1 AND body @> $2 ORDER BY created_at, id",
        )
        .bind(collection.as_str())
        .bind(Value::Object(query.clone()))
        .fetch_all(&self.pool)
        .await?;
        bodies.into_iter().map(into_object).collect()
    }

    async fn update_one(&self, collection: Collection, key: &DocKey, patch: &Data) -> Result<Option<Data>, StoreError> {
        let body = sqlx::query_scalar::<_, Value>(
            "UPDATE documents SET body = body || $4, updated_at = now()
             WHERE ctid = (
                SELECT ctid FROM documents
                WHERE collection = $1 AND id = $2 AND ($3::text IS NULL OR diagram_id = $3)
                ORDER BY created_at LIMIT 1
             )
             RETURNING body",
        )
        .bind(collection.as_str())
        .bind(&key.id)
        .bind(key.diagram_id.as_deref())
        .bind(Value::Object(patch.clone()))
        .fetch_optional(&self.pool)
        .await?;
        body.map(into_object).transpose()
    }

    async fn delete_one(&self, collection: Collection, key: &DocKey) -> Result<Option<Data>, StoreError> {
        let body = sqlx::query_scalar::<_, Value>(
            "DELETE FROM documents
             WHERE ctid = (
                SELECT ctid FROM documents
                WHERE collection = $1 AND id = $2 AND ($3::text IS NULL OR diagram_id = $3)
                ORDER BY created_at LIMIT 1
             )
             RETURNING body",
        )
        .bind(collection.as_str())
        .bind(&key.id)
        .bind(key.diagram_id.as_deref())
        .fetch_optional(&self.pool)
        .await?;
        body.map(into_object).transpose()
    }

    async fn create(&self, collection: Collection, mut record: Data) -> Result<Data, StoreError> {
        let id = ensure_id(&mut record);
        let diagram_id = diagram_of(&record).unwrap_or_default().to_owned();
        let inserted = sqlx::query_scalar::<_, Value>(
            "INSERT INTO documents (collection, id, diagram_id, body) VALUES ($1, $2, $3, $4)
             ON CONFLICT (collection, id, diagram_id) DO NOTHING
             RETURNING body",
        )
        .bind(collection.as_str())
        .bind(&id)
        .bind(&diagram_id)
        .bind(Value::Object(record))
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(body) => into_object(body),
            None => Err(StoreError::Duplicate { collection, id }),
        }
    }
}

fn into_object(body: Value) -> Result<Data, StoreError> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Corrupt(other.to_string())),
    }
}
