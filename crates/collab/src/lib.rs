//! Collaboration authorization and review lifecycle for thesis documents.
//!
//! This crate is the pure core: it holds no I/O, installs no logger and
//! delivers no notifications. Every mutation returns the domain events it
//! produced so the caller can persist first and notify afterwards.
//!
//! # Modules
//!
//! - `permissions`: Roles, role categories and permission levels
//! - `collaborator`: Collaborator records and the per-document set
//! - `authorize`: The single decision point for "may this user do this"
//! - `lifecycle`: Draft → Submitted → Approved → Finalized state machine
//! - `version`: Immutable numbered versions and line diffs
//! - `comment`: Version-bound review comments and threads
//! - `document`: The aggregate tying the above together
//! - `event`: Domain events emitted by mutations
//! - `error`: Error types for the collaboration crate
//!
//! # Example
//!
//! ```
//! use thesis_collab::{
//!     ActionContext, CollaboratorRole, Document, DocumentStatus, NewCollaborator,
//!     PermissionLevel, RoleCategory,
//! };
//!
//! let student = ActionContext::new("student-1");
//! let mut doc = Document::create("On Graphs", "", RoleCategory::Student, &student)
//!     .unwrap()
//!     .value;
//!
//! // The first advisor added becomes the primary advisor
//! doc.add_collaborator(
//!     &student,
//!     NewCollaborator::new("advisor-1", CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadWrite),
//! )
//! .unwrap();
//!
//! doc.create_version(&student, "Chapter 1", "first draft").unwrap();
//! doc.submit(&student).unwrap();
//! doc.approve(&ActionContext::new("advisor-1")).unwrap();
//!
//! assert_eq!(doc.status(), DocumentStatus::Approved);
//! ```

pub mod authorize;
pub mod collaborator;
pub mod comment;
pub mod context;
pub mod document;
pub mod error;
pub mod event;
pub mod ids;
pub mod lifecycle;
pub mod permissions;
pub mod policy;
pub mod version;

pub use authorize::{authorize, check, Action, Decision, DenyReason};
pub use collaborator::{Collaborator, CollaboratorSet, Membership, NewCollaborator};
pub use comment::{Comment, CommentBook, CommentSpan};
pub use context::ActionContext;
pub use document::Document;
pub use error::{CollabError, CollabResult, Entity, ErrorKind, InvariantViolation};
pub use event::{Applied, DomainEvent, EventKind};
pub use ids::{CollaboratorId, CommentId, DocId, RequestId, UserId, VersionId};
pub use lifecycle::{next_status, DocumentStatus, LifecycleEvent, LifecycleEventKind, StatusChange};
pub use permissions::{CollaboratorRole, PermissionLevel, RoleCategory};
pub use policy::{CollaborationPolicy, FinalizePolicy};
pub use version::{diff_lines, DiffLine, Version, VersionDiff, VersionHistory, VersionInfo};
