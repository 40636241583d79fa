//! Document review lifecycle.
//!
//! ```text
//! Draft --Submit--> Submitted --Approve--> Approved --Finalize--> Finalized
//!                     |    ^
//!   RequestRevision   v    | Submit
//!                   Revision
//! ```
//!
//! Any (state, event) pair outside this table is rejected with
//! `InvalidTransition` and leaves the document untouched.

use crate::authorize::{check, Action};
use crate::context::ActionContext;
use crate::document::Document;
use crate::error::{CollabError, CollabResult};
use crate::event::{Applied, DomainEvent, EventKind};
use crate::ids::UserId;
use crate::policy::CollaborationPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a document in its review workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Submitted,
    Revision,
    Approved,
    Finalized,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 5] = [
        DocumentStatus::Draft,
        DocumentStatus::Submitted,
        DocumentStatus::Revision,
        DocumentStatus::Approved,
        DocumentStatus::Finalized,
    ];

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        *self == DocumentStatus::Finalized
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DocumentStatus::Draft => "Draft",
            DocumentStatus::Submitted => "Submitted",
            DocumentStatus::Revision => "Revision",
            DocumentStatus::Approved => "Approved",
            DocumentStatus::Finalized => "Finalized",
        };
        f.write_str(name)
    }
}

/// Event payload-free tag, used in errors and the transition table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEventKind {
    Submit,
    Approve,
    RequestRevision,
    Finalize,
}

impl LifecycleEventKind {
    pub const ALL: [LifecycleEventKind; 4] = [
        LifecycleEventKind::Submit,
        LifecycleEventKind::Approve,
        LifecycleEventKind::RequestRevision,
        LifecycleEventKind::Finalize,
    ];
}

impl std::fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleEventKind::Submit => "Submit",
            LifecycleEventKind::Approve => "Approve",
            LifecycleEventKind::RequestRevision => "RequestRevision",
            LifecycleEventKind::Finalize => "Finalize",
        };
        f.write_str(name)
    }
}

/// A lifecycle event with its payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Submit,
    Approve,
    RequestRevision { reason: String },
    Finalize,
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleEventKind {
        match self {
            LifecycleEvent::Submit => LifecycleEventKind::Submit,
            LifecycleEvent::Approve => LifecycleEventKind::Approve,
            LifecycleEvent::RequestRevision { .. } => LifecycleEventKind::RequestRevision,
            LifecycleEvent::Finalize => LifecycleEventKind::Finalize,
        }
    }
}

/// The transition table. `None` means the pair is not a legal transition.
pub fn next_status(from: DocumentStatus, event: LifecycleEventKind) -> Option<DocumentStatus> {
    use DocumentStatus::*;
    use LifecycleEventKind as E;

    match (from, event) {
        (Draft, E::Submit) => Some(Submitted),
        (Submitted, E::Approve) => Some(Approved),
        (Submitted, E::RequestRevision) => Some(Revision),
        (Revision, E::Submit) => Some(Submitted),
        (Approved, E::Finalize) => Some(Finalized),
        _ => None,
    }
}

/// One executed transition, kept for the document's audit trail
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
    pub event: LifecycleEventKind,
    pub by: UserId,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl Document {
    /// Run a lifecycle event against the document.
    ///
    /// Checks run in this order: transition table, authorization, payload.
    pub fn apply_lifecycle(
        &mut self,
        ctx: &ActionContext,
        event: LifecycleEvent,
        policy: &CollaborationPolicy,
    ) -> CollabResult<Applied<DocumentStatus>> {
        let from = self.status;
        let kind = event.kind();
        let to = next_status(from, kind)
            .ok_or(CollabError::InvalidTransition { from, event: kind })?;

        let action = match kind {
            LifecycleEventKind::Submit => Action::SubmitDocument { status: from },
            LifecycleEventKind::Approve => Action::ApproveDocument,
            LifecycleEventKind::RequestRevision => Action::RequestRevision,
            LifecycleEventKind::Finalize => Action::FinalizeDocument {
                policy: policy.finalize,
            },
        };
        check(&self.collaborators, &ctx.actor, &action)?;

        let reason = match event {
            LifecycleEvent::Submit if self.versions.is_empty() => return Err(CollabError::NoVersion),
            LifecycleEvent::RequestRevision { reason } => {
                let reason = reason.trim().to_string();
                if reason.is_empty() {
                    return Err(CollabError::invalid_input(
                        "a revision request needs a non-empty reason",
                    ));
                }
                Some(reason)
            }
            _ => None,
        };

        let mut domain_event = DomainEvent::new(lifecycle_event_kind(kind), &self.id, ctx)
            .with("from", from.to_string())
            .with("to", to.to_string());

        match kind {
            LifecycleEventKind::Submit => {
                self.submitted_at = Some(ctx.at);
                if let Some(current) = self.versions.current() {
                    domain_event = domain_event.with("versionNumber", current.version_number);
                }
                domain_event = domain_event.with("resubmission", from == DocumentStatus::Revision);
            }
            LifecycleEventKind::Approve => self.approved_at = Some(ctx.at),
            LifecycleEventKind::RequestRevision => {
                self.rejected_at = Some(ctx.at);
                self.rejection_reason = reason.clone();
                if let Some(reason) = &reason {
                    domain_event = domain_event.with("reason", reason.as_str());
                }
            }
            LifecycleEventKind::Finalize => self.finalized_at = Some(ctx.at),
        }

        self.status = to;
        self.updated_at = ctx.at;
        self.status_history.push(StatusChange {
            from,
            to,
            event: kind,
            by: ctx.actor.clone(),
            at: ctx.at,
            reason,
        });

        tracing::info!(document = %self.id, %from, %to, actor = %ctx.actor, "document status changed");
        Ok(Applied::new(to, vec![domain_event]))
    }

    /// Submit a draft or resubmit after a revision request
    pub fn submit(&mut self, ctx: &ActionContext) -> CollabResult<Applied<DocumentStatus>> {
        self.apply_lifecycle(ctx, LifecycleEvent::Submit, &CollaborationPolicy::default())
    }

    pub fn approve(&mut self, ctx: &ActionContext) -> CollabResult<Applied<DocumentStatus>> {
        self.apply_lifecycle(ctx, LifecycleEvent::Approve, &CollaborationPolicy::default())
    }

    pub fn request_revision(
        &mut self,
        ctx: &ActionContext,
        reason: impl Into<String>,
    ) -> CollabResult<Applied<DocumentStatus>> {
        self.apply_lifecycle(
            ctx,
            LifecycleEvent::RequestRevision {
                reason: reason.into(),
            },
            &CollaborationPolicy::default(),
        )
    }

    pub fn finalize(
        &mut self,
        ctx: &ActionContext,
        policy: &CollaborationPolicy,
    ) -> CollabResult<Applied<DocumentStatus>> {
        self.apply_lifecycle(ctx, LifecycleEvent::Finalize, policy)
    }
}

fn lifecycle_event_kind(kind: LifecycleEventKind) -> EventKind {
    match kind {
        LifecycleEventKind::Submit => EventKind::DocumentSubmitted,
        LifecycleEventKind::Approve => EventKind::DocumentApproved,
        LifecycleEventKind::RequestRevision => EventKind::RevisionRequested,
        LifecycleEventKind::Finalize => EventKind::DocumentFinalized,
    }
}
