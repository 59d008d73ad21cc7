//! In-memory document store.

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

use std::collections::HashMap;

use async_trait::async_trait;
use frames::{Collection, Data};
use tokio::sync::RwLock;

use super::{DocKey, DocumentStore, StoreError, ensure_id, matches_query};

/// Documents per collection, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Data>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records` in `collection`.
    #[must_use]
    pub fn with_documents(collection: Collection, records: Vec<Data>) -> Self {
        let mut collections = HashMap::new();
        collections.insert(collection, records);
        Self { collections: RwLock::new(collections) }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: Collection, query: &Data) -> Result<Option<Data>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|doc| matches_query(doc, query)))
            .cloned())
    }

    async fn find_all(&self, collection: Collection, query: &Data) -> Result<Vec<Data>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|docs| docs.iter().filter(|doc| matches_query(doc, query)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update_one(&self, collection: Collection, key: &DocKey, patch: &Data) -> Result<Option<Data>, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|doc| key.matches(doc)))
        else {
            return Ok(None);
        };
        for (field, value) in patch {
            doc.insert(field.clone(), value.clone());
        }
        Ok(Some(doc.clone()))
    }

    async fn delete_one(&self, collection: Collection, key: &DocKey) -> Result<Option<Data>, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(None);
        };
        Ok(docs.iter().position(|doc| key.matches(doc)).map(|i| docs.remove(i)))
    }

    async fn create(&self, collection: Collection, mut record: Data) -> Result<Data, StoreError> {
        let id = ensure_id(&mut record);
        let key = DocKey::of(&record).unwrap_or_else(|| DocKey::new(id.clone(), None));

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();
        if docs.iter().any(|doc| DocKey::of(doc).is_some_and(|k| k == key)) {
            return Err(StoreError::Duplicate { collection, id });
        }
        docs.push(record.clone());
        Ok(record)
    }
}
