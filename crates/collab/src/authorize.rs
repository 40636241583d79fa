//! Authorization engine.
//!
//! Pure decision functions over a collaborator set. Every caller, from the
//! lifecycle to a web handler deciding which buttons to render, goes through
//! [`authorize`] instead of re-deriving permission logic locally.

use crate::collaborator::{Collaborator, CollaboratorSet};
use crate::error::{CollabError, CollabResult};
use crate::ids::UserId;
use crate::lifecycle::DocumentStatus;
use crate::permissions::{PermissionLevel, RoleCategory};
use crate::policy::FinalizePolicy;
use serde::{Deserialize, Serialize};

/// Something an actor wants to do on a document
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action<'a> {
    ViewDocument,
    AddComment,
    ResolveComment { author: &'a UserId },
    DeleteComment { author: &'a UserId },
    EditComment { author: &'a UserId },
    EditContent,
    CreateVersion,
    SubmitDocument { status: DocumentStatus },
    ApproveDocument,
    RequestRevision,
    FinalizeDocument { policy: FinalizePolicy },
    ManageCollaborators,
}

impl Action<'_> {
    /// Short name used in denial messages
    pub fn name(&self) -> &'static str {
        match self {
            Action::ViewDocument => "view the document",
            Action::AddComment => "add comments",
            Action::ResolveComment { .. } => "resolve this comment",
            Action::DeleteComment { .. } => "delete this comment",
            Action::EditComment { .. } => "edit this comment",
            Action::EditContent => "edit content",
            Action::CreateVersion => "create versions",
            Action::SubmitDocument { .. } => "submit the document",
            Action::ApproveDocument => "approve the document",
            Action::RequestRevision => "request a revision",
            Action::FinalizeDocument { .. } => "finalize the document",
            Action::ManageCollaborators => "manage collaborators",
        }
    }
}

/// Machine-readable reason attached to every denial
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenyReason {
    NotACollaborator,
    InsufficientPermission,
    WrongRoleCategory,
    /// The action is not available while the document has this status
    InvalidStatusForAction(DocumentStatus),
}

/// Outcome of an authorization check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert to a typed error naming the actor and the action
    pub fn into_result(self, actor: &UserId, action: &Action<'_>) -> CollabResult<()> {
        let reason = match self {
            Decision::Allow => return Ok(()),
            Decision::Deny(reason) => reason,
        };
        Err(match reason {
            DenyReason::NotACollaborator => CollabError::NotACollaborator(actor.clone()),
            DenyReason::InsufficientPermission => CollabError::InsufficientPermission {
                user: actor.clone(),
                reason: format!("not allowed to {}", action.name()),
            },
            DenyReason::WrongRoleCategory => CollabError::WrongRoleCategory {
                user: actor.clone(),
                reason: format!("only advisors may {}", action.name()),
            },
            DenyReason::InvalidStatusForAction(status) => CollabError::InvalidStatusForAction(status),
        })
    }
}

/// Decide whether `actor` may perform `action`
pub fn authorize(set: &CollaboratorSet, actor: &UserId, action: &Action<'_>) -> Decision {
    let record = match set.active_record(actor) {
        Some(record) => record,
        None => return Decision::Deny(DenyReason::NotACollaborator),
    };
    decide(record, action)
}

/// Like [`authorize`], returning the actor's record when allowed
pub fn check<'s>(
    set: &'s CollaboratorSet,
    actor: &UserId,
    action: &Action<'_>,
) -> CollabResult<&'s Collaborator> {
    authorize(set, actor, action).into_result(actor, action)?;
    set.active_record(actor)
        .ok_or_else(|| CollabError::NotACollaborator(actor.clone()))
}

fn decide(record: &Collaborator, action: &Action<'_>) -> Decision {
    let permission = record.permission;
    let is_advisor = record.category() == RoleCategory::Advisor;

    match action {
        Action::ViewDocument => Decision::Allow,
        Action::AddComment => require(permission.can_comment()),
        Action::ResolveComment { author } | Action::DeleteComment { author } => {
            require(permission.can_manage() || &record.user_id == *author)
        }
        Action::EditComment { author } => {
            require(&record.user_id == *author && permission.can_comment())
        }
        Action::EditContent | Action::CreateVersion => require(permission.can_write()),
        Action::SubmitDocument { status } => {
            if !permission.can_write() {
                Decision::Deny(DenyReason::InsufficientPermission)
            } else if !matches!(status, DocumentStatus::Draft | DocumentStatus::Revision) {
                Decision::Deny(DenyReason::InvalidStatusForAction(*status))
            } else {
                Decision::Allow
            }
        }
        Action::ApproveDocument | Action::RequestRevision => advisor_writer(is_advisor, permission),
        Action::FinalizeDocument { policy } => match policy {
            FinalizePolicy::AdvisorOnly => advisor_writer(is_advisor, permission),
            FinalizePolicy::AdvisorOrManager if permission.can_manage() => Decision::Allow,
            FinalizePolicy::AdvisorOrManager => advisor_writer(is_advisor, permission),
        },
        Action::ManageCollaborators => require(permission.can_manage()),
    }
}

fn require(allowed: bool) -> Decision {
    if allowed {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::InsufficientPermission)
    }
}

// A student with full access must never review their own document.
fn advisor_writer(is_advisor: bool, permission: PermissionLevel) -> Decision {
    if !is_advisor {
        Decision::Deny(DenyReason::WrongRoleCategory)
    } else {
        require(permission.can_write())
    }
}
