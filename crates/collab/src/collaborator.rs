//! Collaborator records and the per-document collaborator set.
//!
//! The set owns the membership rules:
//! - a category with any active member has exactly one active primary
//! - a primary always holds `FullAccess`
//! - manage-other actions never target the actor's own record
//! - removal is a soft delete, so past attribution stays resolvable

use crate::authorize::{check, Action};
use crate::context::ActionContext;
use crate::error::{CollabError, CollabResult, Entity, InvariantViolation};
use crate::event::{Applied, DomainEvent, EventKind};
use crate::ids::{CollaboratorId, DocId, UserId};
use crate::permissions::{CollaboratorRole, PermissionLevel, RoleCategory};
use crate::policy::CollaborationPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whether a collaborator record is live or has been removed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Membership {
    Active,
    Removed { at: DateTime<Utc>, by: UserId },
}

/// A user's collaborator record on one document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: CollaboratorId,
    pub document_id: DocId,
    pub user_id: UserId,
    pub role: CollaboratorRole,
    pub permission: PermissionLevel,
    pub membership: Membership,
    pub added_at: DateTime<Utc>,
    pub added_by: UserId,
    pub last_access_at: Option<DateTime<Utc>>,
}

impl Collaborator {
    pub fn is_active(&self) -> bool {
        self.membership == Membership::Active
    }

    pub fn is_primary(&self) -> bool {
        self.role.is_primary()
    }

    pub fn category(&self) -> RoleCategory {
        self.role.category()
    }

    pub fn can_read(&self) -> bool {
        self.is_active() && self.permission.can_read()
    }

    pub fn can_comment(&self) -> bool {
        self.is_active() && self.permission.can_comment()
    }

    pub fn can_write(&self) -> bool {
        self.is_active() && self.permission.can_write()
    }

    pub fn can_manage(&self) -> bool {
        self.is_active() && self.permission.can_manage()
    }
}

/// Request to attach a new collaborator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCollaborator {
    pub user_id: UserId,
    pub role: CollaboratorRole,
    pub permission: PermissionLevel,
}

impl NewCollaborator {
    pub fn new(
        user_id: impl Into<UserId>,
        role: CollaboratorRole,
        permission: PermissionLevel,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            permission,
        }
    }
}

/// All collaborator records of one document, removed ones included
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorSet {
    document_id: DocId,
    records: Vec<Collaborator>,
}

impl CollaboratorSet {
    /// Create an empty set
    pub fn new(document_id: DocId) -> Self {
        Self {
            document_id,
            records: Vec::new(),
        }
    }

    /// Create a set whose only member is the primary of `category`
    pub fn with_primary(
        document_id: DocId,
        category: RoleCategory,
        ctx: &ActionContext,
    ) -> CollabResult<Self> {
        let role = category.primary_role().ok_or_else(|| {
            CollabError::invalid_input(format!("{} category has no primary role", category))
        })?;

        let mut set = Self::new(document_id.clone());
        set.records.push(Collaborator {
            id: CollaboratorId::new(),
            document_id,
            user_id: ctx.actor.clone(),
            role,
            permission: PermissionLevel::FullAccess,
            membership: Membership::Active,
            added_at: ctx.at,
            added_by: ctx.actor.clone(),
            last_access_at: None,
        });
        Ok(set)
    }

    pub fn document_id(&self) -> &DocId {
        &self.document_id
    }

    // ========== Queries ==========

    /// Get a record by id, active or removed
    pub fn get(&self, id: &CollaboratorId) -> Option<&Collaborator> {
        self.records.iter().find(|c| &c.id == id)
    }

    /// The user's active record, if any
    pub fn active_record(&self, user_id: &UserId) -> Option<&Collaborator> {
        self.records
            .iter()
            .find(|c| c.is_active() && &c.user_id == user_id)
    }

    /// Every record ever attached, in insertion order
    pub fn records(&self) -> &[Collaborator] {
        &self.records
    }

    /// Active records only
    pub fn active(&self) -> impl Iterator<Item = &Collaborator> {
        self.records.iter().filter(|c| c.is_active())
    }

    /// Active records of one category
    pub fn in_category(&self, category: RoleCategory) -> impl Iterator<Item = &Collaborator> {
        self.active().filter(move |c| c.category() == category)
    }

    /// The active primary of `category`
    pub fn primary_of(&self, category: RoleCategory) -> Option<&Collaborator> {
        self.in_category(category).find(|c| c.is_primary())
    }

    /// The user's current record, or their latest removed one
    pub fn attribution(&self, user_id: &UserId) -> Option<&Collaborator> {
        self.active_record(user_id)
            .or_else(|| self.records.iter().rev().find(|c| &c.user_id == user_id))
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    // ========== Invariants ==========

    /// Check the membership invariants over the whole set
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let mut seen = HashSet::new();
        for record in &self.records {
            if record.document_id != self.document_id {
                return Err(InvariantViolation::ForeignRecord(record.id));
            }
            if !record.is_active() {
                continue;
            }
            if !seen.insert(&record.user_id) {
                return Err(InvariantViolation::DuplicateActiveRecord(
                    record.user_id.clone(),
                ));
            }
            if record.is_primary() && record.permission != PermissionLevel::FullAccess {
                return Err(InvariantViolation::PrimaryWithoutFullAccess(
                    record.user_id.clone(),
                ));
            }
        }

        for category in [RoleCategory::Student, RoleCategory::Advisor] {
            let members = self.in_category(category).count();
            let primaries = self.in_category(category).filter(|c| c.is_primary()).count();
            if members > 0 && primaries == 0 {
                return Err(InvariantViolation::MissingPrimary(category));
            }
            if primaries > 1 {
                return Err(InvariantViolation::MultiplePrimaries(category));
            }
        }

        Ok(())
    }

    // ========== Manage-other operations ==========

    /// Attach a new collaborator.
    ///
    /// The first active member of the Student or Advisor category becomes
    /// that category's primary at full access.
    pub fn add(
        &mut self,
        ctx: &ActionContext,
        new: NewCollaborator,
    ) -> CollabResult<Applied<CollaboratorId>> {
        self.require_manager(ctx)?;

        if new.role.is_primary() {
            return Err(CollabError::invalid_input(
                "primary roles are only granted through promote_to_primary",
            ));
        }
        if self.active_record(&new.user_id).is_some() {
            return Err(CollabError::DuplicateCollaborator(new.user_id));
        }

        let (role, permission) = self.entry_role(new.role, new.permission, None);
        let record = Collaborator {
            id: CollaboratorId::new(),
            document_id: self.document_id.clone(),
            user_id: new.user_id,
            role,
            permission,
            membership: Membership::Active,
            added_at: ctx.at,
            added_by: ctx.actor.clone(),
            last_access_at: None,
        };
        let id = record.id;

        let event = DomainEvent::new(EventKind::CollaboratorAdded, &self.document_id, ctx)
            .affecting(&record.user_id)
            .with("collaboratorId", id.to_string())
            .with("role", role.as_str())
            .with("permission", permission.to_string());

        tracing::debug!(document = %self.document_id, user = %record.user_id, %role, "collaborator added");
        self.records.push(record);
        Ok(Applied::new(id, vec![event]))
    }

    /// Soft-remove another collaborator. Removing an already removed record is a no-op.
    pub fn remove(&mut self, ctx: &ActionContext, target: CollaboratorId) -> CollabResult<Applied<()>> {
        self.require_manager(ctx)?;
        let idx = self.index_of(&target)?;

        let record = &self.records[idx];
        if !record.is_active() {
            return Ok(Applied::unchanged(()));
        }
        if record.user_id == ctx.actor {
            return Err(CollabError::SelfActionNotAllowed(ctx.actor.clone()));
        }
        if record.is_primary() {
            return Err(CollabError::LastPrimaryViolation(record.user_id.clone()));
        }

        Ok(Applied::new((), vec![self.deactivate(idx, ctx)]))
    }

    /// Change another collaborator's role
    pub fn update_role(
        &mut self,
        ctx: &ActionContext,
        target: CollaboratorId,
        new_role: CollaboratorRole,
        policy: &CollaborationPolicy,
    ) -> CollabResult<Applied<()>> {
        self.require_manager(ctx)?;
        let idx = self.active_index_of(&target)?;

        let record = &self.records[idx];
        if record.user_id == ctx.actor {
            return Err(CollabError::SelfActionNotAllowed(ctx.actor.clone()));
        }
        if record.role == new_role {
            return Ok(Applied::unchanged(()));
        }
        if record.is_primary() {
            return Err(CollabError::LastPrimaryViolation(record.user_id.clone()));
        }
        if new_role.is_primary() {
            return Err(CollabError::invalid_input(
                "primary roles are only granted through promote_to_primary",
            ));
        }
        if record.category() != new_role.category() && !policy.allow_cross_category_role_change {
            return Err(CollabError::WrongRoleCategory {
                user: record.user_id.clone(),
                reason: format!(
                    "cannot move from the {} category to the {} category",
                    record.category(),
                    new_role.category()
                ),
            });
        }

        let old_role = record.role;
        let old_permission = record.permission;
        let (role, permission) = self.entry_role(new_role, old_permission, Some(idx));

        let record = &mut self.records[idx];
        record.role = role;
        record.permission = permission;

        let mut events = vec![DomainEvent::new(EventKind::RoleChanged, &self.document_id, ctx)
            .affecting(&record.user_id)
            .with("collaboratorId", record.id.to_string())
            .with("from", old_role.as_str())
            .with("to", role.as_str())];
        if permission != old_permission {
            events.push(
                DomainEvent::new(EventKind::PermissionChanged, &self.document_id, ctx)
                    .affecting(&record.user_id)
                    .with("collaboratorId", record.id.to_string())
                    .with("from", old_permission.to_string())
                    .with("to", permission.to_string()),
            );
        }
        Ok(Applied::new((), events))
    }

    /// Change another collaborator's permission. Primaries are fixed at full access.
    pub fn update_permission(
        &mut self,
        ctx: &ActionContext,
        target: CollaboratorId,
        new_permission: PermissionLevel,
    ) -> CollabResult<Applied<()>> {
        self.require_manager(ctx)?;
        let idx = self.active_index_of(&target)?;

        let record = &self.records[idx];
        if record.user_id == ctx.actor {
            return Err(CollabError::SelfActionNotAllowed(ctx.actor.clone()));
        }
        if record.permission == new_permission {
            return Ok(Applied::unchanged(()));
        }
        if record.is_primary() {
            return Err(CollabError::LastPrimaryViolation(record.user_id.clone()));
        }

        let record = &mut self.records[idx];
        let old = record.permission;
        record.permission = new_permission;

        let event = DomainEvent::new(EventKind::PermissionChanged, &self.document_id, ctx)
            .affecting(&record.user_id)
            .with("collaboratorId", record.id.to_string())
            .with("from", old.to_string())
            .with("to", new_permission.to_string());
        Ok(Applied::new((), vec![event]))
    }

    /// Make `target` the primary of its category, demoting the current primary
    /// to the category's secondary role at `ReadWrite`.
    ///
    /// Both writes happen after every check has passed, so a caller never
    /// observes a category with zero or two primaries.
    pub fn promote_to_primary(
        &mut self,
        ctx: &ActionContext,
        target: CollaboratorId,
    ) -> CollabResult<Applied<()>> {
        self.require_manager(ctx)?;
        let idx = self.active_index_of(&target)?;

        let record = &self.records[idx];
        if record.user_id == ctx.actor {
            return Err(CollabError::SelfActionNotAllowed(ctx.actor.clone()));
        }
        if record.is_primary() {
            return Ok(Applied::unchanged(()));
        }

        let category = record.category();
        let (primary_role, secondary_role) = match (category.primary_role(), category.secondary_role()) {
            (Some(p), Some(s)) => (p, s),
            _ => {
                return Err(CollabError::WrongRoleCategory {
                    user: record.user_id.clone(),
                    reason: format!("the {} category has no primary role", category),
                })
            }
        };

        let previous = self
            .records
            .iter()
            .position(|c| c.is_active() && c.role == primary_role);

        let mut events = Vec::with_capacity(2);
        let mut promoted = DomainEvent::new(EventKind::PrimaryPromoted, &self.document_id, ctx)
            .affecting(&self.records[idx].user_id)
            .with("collaboratorId", target.to_string())
            .with("from", self.records[idx].role.as_str())
            .with("to", primary_role.as_str());

        if let Some(prev) = previous {
            let demoted = &mut self.records[prev];
            demoted.role = secondary_role;
            demoted.permission = PermissionLevel::ReadWrite;

            promoted = promoted.with("previousPrimaryUserId", demoted.user_id.0.clone());
            events.push(promoted);
            events.push(
                DomainEvent::new(EventKind::RoleChanged, &self.document_id, ctx)
                    .affecting(&demoted.user_id)
                    .with("collaboratorId", demoted.id.to_string())
                    .with("from", primary_role.as_str())
                    .with("to", secondary_role.as_str())
                    .with("permission", PermissionLevel::ReadWrite.to_string()),
            );
        } else {
            events.push(promoted);
        }

        let record = &mut self.records[idx];
        record.role = primary_role;
        record.permission = PermissionLevel::FullAccess;

        tracing::debug!(document = %self.document_id, user = %record.user_id, %category, "primary promoted");
        Ok(Applied::new((), events))
    }

    // ========== Self-service operations ==========

    /// Remove the actor's own record. A primary must hand over first.
    pub fn leave(&mut self, ctx: &ActionContext) -> CollabResult<Applied<()>> {
        let idx = self
            .records
            .iter()
            .position(|c| c.is_active() && c.user_id == ctx.actor)
            .ok_or_else(|| CollabError::NotACollaborator(ctx.actor.clone()))?;

        if self.records[idx].is_primary() {
            return Err(CollabError::LastPrimaryViolation(ctx.actor.clone()));
        }

        Ok(Applied::new((), vec![self.deactivate(idx, ctx)]))
    }

    /// Stamp the user's last access time
    pub fn record_access(&mut self, user_id: &UserId, at: DateTime<Utc>) -> CollabResult<()> {
        let record = self
            .records
            .iter_mut()
            .find(|c| c.is_active() && &c.user_id == user_id)
            .ok_or_else(|| CollabError::NotACollaborator(user_id.clone()))?;
        record.last_access_at = Some(at);
        Ok(())
    }

    // ========== Internals ==========

    fn require_manager(&self, ctx: &ActionContext) -> CollabResult<()> {
        check(self, &ctx.actor, &Action::ManageCollaborators).map(|_| ())
    }

    fn index_of(&self, id: &CollaboratorId) -> CollabResult<usize> {
        self.records
            .iter()
            .position(|c| &c.id == id)
            .ok_or(CollabError::EntityNotFound(Entity::Collaborator(*id)))
    }

    fn active_index_of(&self, id: &CollaboratorId) -> CollabResult<usize> {
        let idx = self.index_of(id)?;
        if self.records[idx].is_active() {
            Ok(idx)
        } else {
            Err(CollabError::EntityNotFound(Entity::Collaborator(*id)))
        }
    }

    /// Role and permission a member takes on entering `role`'s category.
    /// `moving` is the index of a record already in the set that is changing category.
    fn entry_role(
        &self,
        role: CollaboratorRole,
        permission: PermissionLevel,
        moving: Option<usize>,
    ) -> (CollaboratorRole, PermissionLevel) {
        let category = role.category();
        let occupied = self
            .records
            .iter()
            .enumerate()
            .any(|(i, c)| Some(i) != moving && c.is_active() && c.category() == category);

        match category.primary_role() {
            Some(primary) if !occupied => (primary, PermissionLevel::FullAccess),
            _ => (role, permission),
        }
    }

    fn deactivate(&mut self, idx: usize, ctx: &ActionContext) -> DomainEvent {
        let record = &mut self.records[idx];
        record.membership = Membership::Removed {
            at: ctx.at,
            by: ctx.actor.clone(),
        };
        tracing::debug!(document = %self.document_id, user = %record.user_id, "collaborator removed");
        DomainEvent::new(EventKind::CollaboratorRemoved, &self.document_id, ctx)
            .affecting(&record.user_id)
            .with("collaboratorId", record.id.to_string())
            .with("role", record.role.as_str())
    }
}
