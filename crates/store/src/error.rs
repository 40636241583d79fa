//! Error types for storage operations

use thesis_collab::{CollabError, DocId, InvariantViolation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    DocumentNotFound(DocId),

    #[error("Document already exists: {0}")]
    DocumentExists(DocId),

    #[error("Invalid document id: {0}")]
    InvalidDocumentId(DocId),

    /// Stored state breaks an invariant, or a lock was poisoned
    #[error("Corrupt state: {0}")]
    Corrupt(String),

    /// The operation was rejected by the collaboration rules
    #[error(transparent)]
    Collab(#[from] CollabError),
}

impl From<InvariantViolation> for StoreError {
    fn from(err: InvariantViolation) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl StoreError {
    /// The business-rule rejection, if that is what this error is
    pub fn as_collab(&self) -> Option<&CollabError> {
        match self {
            StoreError::Collab(err) => Some(err),
            _ => None,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub(crate) fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Corrupt("lock poisoned".to_string())
}
