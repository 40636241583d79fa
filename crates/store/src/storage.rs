//! Document storage abstraction.
//!
//! This module defines the `DocumentStore` trait that provides a unified interface
//! for persisting and retrieving whole documents. Each document is stored as one
//! unit, so saving it is atomic with respect to its collaborators, versions and
//! comments.

use crate::{StoreError, StoreResult};
use thesis_collab::{DocId, Document};

/// Trait for document storage backends
///
/// # Thread Safety
///
/// The trait methods take `&self` to allow for internal mutability patterns
/// (e.g., using `Mutex` or `RwLock`). Writers to the same document are
/// serialized by the caller, not by the backend.
pub trait DocumentStore: Send + Sync {
    /// Load a document. Fails with `DocumentNotFound` if it was never saved.
    fn load(&self, doc_id: &DocId) -> StoreResult<Document>;

    /// Insert or replace a document
    fn save(&self, document: &Document) -> StoreResult<()>;

    /// List the ids of every stored document, sorted
    fn list(&self) -> StoreResult<Vec<DocId>>;

    /// Check if a document exists in storage
    fn exists(&self, doc_id: &DocId) -> StoreResult<bool> {
        match self.load(doc_id) {
            Ok(_) => Ok(true),
            Err(StoreError::DocumentNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for Box<S> {
    fn load(&self, doc_id: &DocId) -> StoreResult<Document> {
        (**self).load(doc_id)
    }

    fn save(&self, document: &Document) -> StoreResult<()> {
        (**self).save(document)
    }

    fn list(&self) -> StoreResult<Vec<DocId>> {
        (**self).list()
    }

    fn exists(&self, doc_id: &DocId) -> StoreResult<bool> {
        (**self).exists(doc_id)
    }
}
