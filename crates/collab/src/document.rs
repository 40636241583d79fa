//! The document aggregate.
//!
//! A [`Document`] owns its collaborator set, version history and comments.
//! Every mutation goes through a method here (or in the lifecycle, version
//! and comment modules), so the invariants are checked in one place.

use crate::authorize::{authorize, Action, Decision};
use crate::collaborator::{Collaborator, CollaboratorSet, NewCollaborator};
use crate::comment::{Comment, CommentBook};
use crate::context::ActionContext;
use crate::error::{CollabError, CollabResult, InvariantViolation};
use crate::event::{Applied, DomainEvent, EventKind};
use crate::ids::{CollaboratorId, CommentId, DocId, UserId, VersionId};
use crate::lifecycle::{DocumentStatus, StatusChange};
use crate::permissions::{CollaboratorRole, PermissionLevel, RoleCategory};
use crate::policy::CollaborationPolicy;
use crate::version::{Version, VersionHistory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A thesis document under collaborative review
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub(crate) id: DocId,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) status: DocumentStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) submitted_at: Option<DateTime<Utc>>,
    pub(crate) approved_at: Option<DateTime<Utc>>,
    pub(crate) rejected_at: Option<DateTime<Utc>>,
    pub(crate) rejection_reason: Option<String>,
    pub(crate) finalized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) status_history: Vec<StatusChange>,
    pub(crate) collaborators: CollaboratorSet,
    pub(crate) versions: VersionHistory,
    #[serde(default)]
    pub(crate) comments: CommentBook,
}

impl Document {
    /// Create a draft with a generated id. The acting user becomes the
    /// primary of `creator_category` at full access.
    pub fn create(
        title: impl Into<String>,
        description: impl Into<String>,
        creator_category: RoleCategory,
        ctx: &ActionContext,
    ) -> CollabResult<Applied<Document>> {
        Self::create_with_id(DocId::generate(), title, description, creator_category, ctx)
    }

    /// Create a draft under a caller-chosen id
    pub fn create_with_id(
        id: DocId,
        title: impl Into<String>,
        description: impl Into<String>,
        creator_category: RoleCategory,
        ctx: &ActionContext,
    ) -> CollabResult<Applied<Document>> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(CollabError::invalid_input("document title cannot be empty"));
        }
        if id.as_str().trim().is_empty() {
            return Err(CollabError::invalid_input("document id cannot be empty"));
        }

        let collaborators = CollaboratorSet::with_primary(id.clone(), creator_category, ctx)?;
        let doc = Document {
            id: id.clone(),
            title,
            description: description.into(),
            status: DocumentStatus::Draft,
            created_at: ctx.at,
            updated_at: ctx.at,
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            finalized_at: None,
            status_history: Vec::new(),
            collaborators,
            versions: VersionHistory::new(id.clone()),
            comments: CommentBook::new(),
        };

        let event = DomainEvent::new(EventKind::DocumentCreated, &id, ctx)
            .affecting(&ctx.actor)
            .with("title", doc.title.as_str())
            .with("creatorCategory", creator_category.to_string());

        tracing::info!(document = %id, actor = %ctx.actor, "document created");
        Ok(Applied::new(doc, vec![event]))
    }

    // ========== Getters ==========

    pub fn id(&self) -> &DocId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn rejected_at(&self) -> Option<DateTime<Utc>> {
        self.rejected_at
    }

    /// Reason given with the latest revision request
    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    /// Every executed transition, oldest first
    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn collaborators(&self) -> &CollaboratorSet {
        &self.collaborators
    }

    pub fn versions(&self) -> &VersionHistory {
        &self.versions
    }

    pub fn comments(&self) -> &CommentBook {
        &self.comments
    }

    // ========== Listings ==========

    pub fn current_version(&self) -> Option<&Version> {
        self.versions.current()
    }

    pub fn active_collaborators(&self) -> Vec<&Collaborator> {
        self.collaborators.active().collect()
    }

    pub fn collaborators_in(&self, category: RoleCategory) -> Vec<&Collaborator> {
        self.collaborators.in_category(category).collect()
    }

    pub fn active_comments(&self, version_id: &VersionId) -> Vec<&Comment> {
        self.comments.active_for(version_id)
    }

    pub fn unresolved_comments(&self, version_id: &VersionId) -> Vec<&Comment> {
        self.comments.unresolved_for(version_id)
    }

    pub fn thread(&self, root: &CommentId) -> Vec<&Comment> {
        self.comments.thread(root)
    }

    // ========== Authorization ==========

    /// Decide whether `actor` may perform `action` on this document
    pub fn authorize(&self, actor: &UserId, action: &Action<'_>) -> Decision {
        authorize(&self.collaborators, actor, action)
    }

    /// Status-aware answer for rendering: the decision plus whether the
    /// lifecycle would accept the action right now.
    pub fn can(&self, actor: &UserId, action: &Action<'_>) -> bool {
        let status_ok = match action {
            Action::SubmitDocument { .. } => {
                matches!(self.status, DocumentStatus::Draft | DocumentStatus::Revision)
            }
            Action::ApproveDocument | Action::RequestRevision => {
                self.status == DocumentStatus::Submitted
            }
            Action::FinalizeDocument { .. } => self.status == DocumentStatus::Approved,
            Action::CreateVersion | Action::EditContent => self.status != DocumentStatus::Finalized,
            _ => true,
        };
        status_ok && self.authorize(actor, action).is_allowed()
    }

    // ========== Collaborators ==========

    pub fn add_collaborator(
        &mut self,
        ctx: &ActionContext,
        new: NewCollaborator,
    ) -> CollabResult<Applied<CollaboratorId>> {
        let applied = self.collaborators.add(ctx, new)?;
        self.touch(ctx, &applied.events);
        Ok(applied)
    }

    pub fn remove_collaborator(
        &mut self,
        ctx: &ActionContext,
        target: CollaboratorId,
    ) -> CollabResult<Applied<()>> {
        let applied = self.collaborators.remove(ctx, target)?;
        self.touch(ctx, &applied.events);
        Ok(applied)
    }

    pub fn update_role(
        &mut self,
        ctx: &ActionContext,
        target: CollaboratorId,
        role: CollaboratorRole,
        policy: &CollaborationPolicy,
    ) -> CollabResult<Applied<()>> {
        let applied = self.collaborators.update_role(ctx, target, role, policy)?;
        self.touch(ctx, &applied.events);
        Ok(applied)
    }

    pub fn update_permission(
        &mut self,
        ctx: &ActionContext,
        target: CollaboratorId,
        permission: PermissionLevel,
    ) -> CollabResult<Applied<()>> {
        let applied = self.collaborators.update_permission(ctx, target, permission)?;
        self.touch(ctx, &applied.events);
        Ok(applied)
    }

    pub fn promote_to_primary(
        &mut self,
        ctx: &ActionContext,
        target: CollaboratorId,
    ) -> CollabResult<Applied<()>> {
        let applied = self.collaborators.promote_to_primary(ctx, target)?;
        self.touch(ctx, &applied.events);
        Ok(applied)
    }

    pub fn leave(&mut self, ctx: &ActionContext) -> CollabResult<Applied<()>> {
        let applied = self.collaborators.leave(ctx)?;
        self.touch(ctx, &applied.events);
        Ok(applied)
    }

    /// Stamp the user's last access. Does not change `updated_at`.
    pub fn record_access(&mut self, user_id: &UserId, at: DateTime<Utc>) -> CollabResult<()> {
        self.collaborators.record_access(user_id, at)
    }

    // ========== Invariants ==========

    /// Check every cross-entity invariant
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        self.collaborators.verify()?;
        self.versions.verify()?;
        self.comments
            .verify(|version_id| self.versions.get(version_id).is_some())
    }

    fn touch(&mut self, ctx: &ActionContext, events: &[DomainEvent]) {
        if !events.is_empty() {
            self.updated_at = ctx.at;
        }
    }
}
