//! In-memory document store implementation.
//!
//! Intended for development, tests, and deployments that keep no state
//! across restarts.

use crate::error::poisoned;
use crate::storage::DocumentStore;
use crate::{StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::RwLock;
use thesis_collab::{DocId, Document};

/// In-memory implementation of `DocumentStore`
///
/// Read operations acquire a read lock, allowing concurrent reads.
/// Write operations acquire a write lock, ensuring exclusive access.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<DocId, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn load(&self, doc_id: &DocId) -> StoreResult<Document> {
        let docs = self.documents.read().map_err(poisoned)?;
        docs.get(doc_id)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound(doc_id.clone()))
    }

    fn save(&self, document: &Document) -> StoreResult<()> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        docs.insert(document.id().clone(), document.clone());
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<DocId>> {
        let docs = self.documents.read().map_err(poisoned)?;
        let mut ids: Vec<DocId> = docs.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, doc_id: &DocId) -> StoreResult<bool> {
        let docs = self.documents.read().map_err(poisoned)?;
        Ok(docs.contains_key(doc_id))
    }
}
