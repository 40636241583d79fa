//! Error types for the collaboration crate.

use crate::ids::{CollaboratorId, CommentId, UserId, VersionId};
use crate::lifecycle::{DocumentStatus, LifecycleEventKind};
use crate::permissions::RoleCategory;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for collaboration operations.
pub type CollabResult<T> = Result<T, CollabError>;

/// Flat, machine-readable error kind for callers that render messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotACollaborator,
    InsufficientPermission,
    WrongRoleCategory,
    InvalidStatusForAction,
    InvalidTransition,
    DuplicateCollaborator,
    LastPrimaryViolation,
    SelfActionNotAllowed,
    EntityNotFound,
    InvalidInput,
    NoVersion,
}

/// The entity an `EntityNotFound` error refers to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    Collaborator(CollaboratorId),
    Version(VersionId),
    Comment(CommentId),
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Collaborator(id) => write!(f, "collaborator {}", id),
            Entity::Version(id) => write!(f, "version {}", id),
            Entity::Comment(id) => write!(f, "comment {}", id),
        }
    }
}

/// Errors that can occur during collaboration operations.
///
/// Every variant is an expected business outcome; none of them is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollabError {
    /// The actor has no active collaborator record on the document.
    #[error("User {0} is not a collaborator on this document")]
    NotACollaborator(UserId),

    /// The actor's permission level is below what the action requires.
    #[error("Insufficient permission for {user}: {reason}")]
    InsufficientPermission { user: UserId, reason: String },

    /// The action is reserved for a role category the actor does not hold.
    #[error("Wrong role category for {user}: {reason}")]
    WrongRoleCategory { user: UserId, reason: String },

    /// The action is not allowed while the document has this status.
    #[error("Action not allowed while document is {0}")]
    InvalidStatusForAction(DocumentStatus),

    /// No lifecycle transition exists for this state and event.
    #[error("Invalid transition: {event} is not allowed from {from}")]
    InvalidTransition {
        from: DocumentStatus,
        event: LifecycleEventKind,
    },

    /// The user already holds an active record on this document.
    #[error("User {0} is already an active collaborator")]
    DuplicateCollaborator(UserId),

    /// The change would leave a category without its primary collaborator.
    #[error("Cannot remove or demote the primary collaborator {0}; promote another collaborator first")]
    LastPrimaryViolation(UserId),

    /// Manage-other actions cannot target the actor's own record.
    #[error("User {0} cannot perform this action on their own record")]
    SelfActionNotAllowed(UserId),

    /// A referenced entity does not exist on this document.
    #[error("Not found: {0}")]
    EntityNotFound(Entity),

    /// Request failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Submission requires at least one version.
    #[error("Document has no versions to submit")]
    NoVersion,
}

/// A broken document invariant found in loaded or computed state.
///
/// Unlike [`CollabError`], this signals corrupt data rather than a rejected request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("{0} category has active collaborators but no primary")]
    MissingPrimary(RoleCategory),
    #[error("{0} category has more than one active primary")]
    MultiplePrimaries(RoleCategory),
    #[error("Primary collaborator {0} does not hold full access")]
    PrimaryWithoutFullAccess(UserId),
    #[error("User {0} holds more than one active record")]
    DuplicateActiveRecord(UserId),
    #[error("Record {0} belongs to another document")]
    ForeignRecord(CollaboratorId),
    #[error("Version numbers are not contiguous at {0}")]
    VersionSequence(u64),
    #[error("Comment {0} references a missing version or parent")]
    DanglingComment(CommentId),
}

impl CollabError {
    /// Machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CollabError::NotACollaborator(_) => ErrorKind::NotACollaborator,
            CollabError::InsufficientPermission { .. } => ErrorKind::InsufficientPermission,
            CollabError::WrongRoleCategory { .. } => ErrorKind::WrongRoleCategory,
            CollabError::InvalidStatusForAction(_) => ErrorKind::InvalidStatusForAction,
            CollabError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CollabError::DuplicateCollaborator(_) => ErrorKind::DuplicateCollaborator,
            CollabError::LastPrimaryViolation(_) => ErrorKind::LastPrimaryViolation,
            CollabError::SelfActionNotAllowed(_) => ErrorKind::SelfActionNotAllowed,
            CollabError::EntityNotFound(_) => ErrorKind::EntityNotFound,
            CollabError::InvalidInput(_) => ErrorKind::InvalidInput,
            CollabError::NoVersion => ErrorKind::NoVersion,
        }
    }

    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        CollabError::InvalidInput(msg.into())
    }
}
