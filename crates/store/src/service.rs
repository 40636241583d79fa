//! Per-document serialized access to stored documents.
//!
//! Every mutation on one document runs under that document's lock:
//!
//! ```text
//! lock -> replay check -> load -> apply -> verify -> save -> publish -> unlock
//! ```
//!
//! A rejected or failing operation returns before `save`, so storage keeps
//! the previous state. Different documents never contend. Reads load a
//! snapshot without taking the lock.
//!
//! A request id replays only for the same actor asking for the same
//! operation. Reusing it for anything else runs the operation's checks and
//! is then rejected with `InvalidInput`.

use crate::error::poisoned;
use crate::events::{EventSink, NullSink};
use crate::file_store::FileDocumentStore;
use crate::memory_store::MemoryDocumentStore;
use crate::settings::StoreSettings;
use crate::storage::DocumentStore;
use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, RwLock};
use thesis_collab::{
    Action, ActionContext, Applied, CollabError, CollabResult, CollaborationPolicy, CollaboratorId,
    CollaboratorRole, CommentId, CommentSpan, Decision, DocId, Document, DocumentStatus,
    DomainEvent, LifecycleEvent, NewCollaborator, PermissionLevel, RequestId, RoleCategory,
    UserId, VersionDiff, VersionId,
};

/// Result of a mutation submitted through the service
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    /// The operation ran. An empty event list means it changed nothing.
    Committed(Applied<T>),
    /// The request id was seen before; these are the events it produced then
    Replayed(Vec<DomainEvent>),
}

impl<T> Outcome<T> {
    pub fn is_replay(&self) -> bool {
        matches!(self, Outcome::Replayed(_))
    }

    pub fn events(&self) -> &[DomainEvent] {
        match self {
            Outcome::Committed(applied) => &applied.events,
            Outcome::Replayed(events) => events,
        }
    }

    /// The operation's value, absent for a replay
    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Committed(applied) => Some(applied.value),
            Outcome::Replayed(_) => None,
        }
    }
}

/// Who sent a request and what it asked for
#[derive(Clone, Debug, PartialEq)]
struct RequestFingerprint {
    actor: UserId,
    operation: Value,
}

struct ReplayEntry {
    fingerprint: RequestFingerprint,
    events: Vec<DomainEvent>,
}

/// Bounded request id -> outcome map, oldest evicted first
struct ReplayCache {
    capacity: usize,
    order: VecDeque<RequestId>,
    entries: HashMap<RequestId, ReplayEntry>,
}

impl ReplayCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, request_id: &RequestId) -> Option<&ReplayEntry> {
        self.entries.get(request_id)
    }

    fn remember(&mut self, request_id: RequestId, entry: ReplayEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(request_id.clone(), entry).is_none() {
            self.order.push_back(request_id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Per-document lock and the state guarded by it
struct DocumentSlot {
    replays: ReplayCache,
}

/// Serializes mutations per document over a [`DocumentStore`]
pub struct DocumentService<S: DocumentStore> {
    store: S,
    sink: Arc<dyn EventSink>,
    policy: CollaborationPolicy,
    replay_cache_size: usize,
    slots: RwLock<HashMap<DocId, Arc<Mutex<DocumentSlot>>>>,
}

impl DocumentService<Box<dyn DocumentStore>> {
    /// Build a service from settings: a file store when `data_dir` is set,
    /// otherwise an in-memory store.
    pub fn from_settings(settings: &StoreSettings) -> StoreResult<Self> {
        let store: Box<dyn DocumentStore> = match &settings.data_dir {
            Some(dir) => Box::new(FileDocumentStore::new(dir)?),
            None => Box::new(MemoryDocumentStore::new()),
        };
        Ok(DocumentService::new(store)
            .with_policy(settings.policy.clone())
            .with_replay_cache_size(settings.replay_cache_size))
    }
}

impl<S: DocumentStore> DocumentService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            sink: Arc::new(NullSink),
            policy: CollaborationPolicy::default(),
            replay_cache_size: StoreSettings::default().replay_cache_size,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_policy(mut self, policy: CollaborationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_replay_cache_size(mut self, size: usize) -> Self {
        self.replay_cache_size = size;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &CollaborationPolicy {
        &self.policy
    }

    // ========== Core mutation path ==========

    /// Run `op` against the stored document under its lock and commit the result.
    ///
    /// `operation` describes the request for replay matching. It must hold
    /// every argument that changes what `op` does.
    pub fn mutate<T, F>(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        operation: Value,
        op: F,
    ) -> StoreResult<Outcome<T>>
    where
        F: FnOnce(&mut Document, &ActionContext, &CollaborationPolicy) -> CollabResult<Applied<T>>,
    {
        let slot = self.slot(doc_id)?;
        let mut guard = slot.lock().map_err(poisoned)?;
        tracing::debug!(document = %doc_id, actor = %ctx.actor, "document lock acquired");

        let fingerprint = RequestFingerprint {
            actor: ctx.actor.clone(),
            operation,
        };
        let mut reused = false;
        if let Some(request_id) = &ctx.request_id {
            match guard.replays.get(request_id) {
                Some(entry) if entry.fingerprint == fingerprint => {
                    tracing::debug!(document = %doc_id, %request_id, "request replayed");
                    return Ok(Outcome::Replayed(entry.events.clone()));
                }
                Some(_) => reused = true,
                None => {}
            }
        }

        let mut document = match self.load_verified(doc_id) {
            Ok(document) => document,
            Err(StoreError::DocumentNotFound(id)) => {
                drop(guard);
                self.release_slot(doc_id, &slot)?;
                return Err(StoreError::DocumentNotFound(id));
            }
            Err(err) => return Err(err),
        };
        let applied = match op(&mut document, ctx, &self.policy) {
            Ok(applied) => applied,
            Err(err) => {
                tracing::warn!(document = %doc_id, actor = %ctx.actor, kind = ?err.kind(), "operation rejected: {}", err);
                return Err(err.into());
            }
        };

        if let (true, Some(request_id)) = (reused, &ctx.request_id) {
            tracing::warn!(document = %doc_id, actor = %ctx.actor, %request_id, "request id reused for a different request");
            return Err(CollabError::InvalidInput(format!(
                "request id {} was already used for a different request",
                request_id
            ))
            .into());
        }

        if applied.is_noop() {
            tracing::debug!(document = %doc_id, actor = %ctx.actor, "operation changed nothing");
            return Ok(Outcome::Committed(applied));
        }

        document.verify()?;
        self.store.save(&document)?;
        if let Some(request_id) = &ctx.request_id {
            guard.replays.remember(
                request_id.clone(),
                ReplayEntry {
                    fingerprint,
                    events: applied.events.clone(),
                },
            );
        }
        self.sink.publish(&applied.events);

        tracing::info!(document = %doc_id, actor = %ctx.actor, events = applied.events.len(), "mutation committed");
        Ok(Outcome::Committed(applied))
    }

    /// Lock slot of a stored document. Unknown ids get no slot.
    fn slot(&self, doc_id: &DocId) -> StoreResult<Arc<Mutex<DocumentSlot>>> {
        {
            let slots = self.slots.read().map_err(poisoned)?;
            if let Some(slot) = slots.get(doc_id) {
                return Ok(Arc::clone(slot));
            }
        }

        if !self.store.exists(doc_id)? {
            return Err(StoreError::DocumentNotFound(doc_id.clone()));
        }
        self.insert_slot(doc_id)
    }

    fn insert_slot(&self, doc_id: &DocId) -> StoreResult<Arc<Mutex<DocumentSlot>>> {
        let mut slots = self.slots.write().map_err(poisoned)?;
        let slot = slots.entry(doc_id.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(DocumentSlot {
                replays: ReplayCache::new(self.replay_cache_size),
            }))
        });
        Ok(Arc::clone(slot))
    }

    /// Forget the slot of a document that is not stored, unless another
    /// caller is holding or waiting on it
    fn release_slot(&self, doc_id: &DocId, slot: &Arc<Mutex<DocumentSlot>>) -> StoreResult<()> {
        let mut slots = self.slots.write().map_err(poisoned)?;
        let tracked = slots.get(doc_id).is_some_and(|s| Arc::ptr_eq(s, slot));
        if tracked && Arc::strong_count(slot) == 2 && !self.store.exists(doc_id)? {
            slots.remove(doc_id);
        }
        Ok(())
    }

    fn load_verified(&self, doc_id: &DocId) -> StoreResult<Document> {
        let document = self.store.load(doc_id)?;
        if let Err(violation) = document.verify() {
            tracing::warn!(document = %doc_id, "stored document is corrupt: {}", violation);
            return Err(violation.into());
        }
        Ok(document)
    }

    // ========== Documents ==========

    /// Create and store a new draft under a generated id
    pub fn create_document(
        &self,
        title: &str,
        description: &str,
        creator_category: RoleCategory,
        ctx: &ActionContext,
    ) -> StoreResult<Applied<Document>> {
        self.create_document_with_id(DocId::generate(), title, description, creator_category, ctx)
    }

    pub fn create_document_with_id(
        &self,
        doc_id: DocId,
        title: &str,
        description: &str,
        creator_category: RoleCategory,
        ctx: &ActionContext,
    ) -> StoreResult<Applied<Document>> {
        let slot = self.insert_slot(&doc_id)?;
        let guard = slot.lock().map_err(poisoned)?;

        let created = self.store_new(doc_id.clone(), title, description, creator_category, ctx);
        drop(guard);
        if created.is_err() {
            self.release_slot(&doc_id, &slot)?;
        }
        created
    }

    fn store_new(
        &self,
        doc_id: DocId,
        title: &str,
        description: &str,
        creator_category: RoleCategory,
        ctx: &ActionContext,
    ) -> StoreResult<Applied<Document>> {
        if self.store.exists(&doc_id)? {
            return Err(StoreError::DocumentExists(doc_id));
        }
        let applied = Document::create_with_id(doc_id, title, description, creator_category, ctx)?;
        applied.value.verify()?;
        self.store.save(&applied.value)?;
        self.sink.publish(&applied.events);

        tracing::info!(document = %applied.value.id(), actor = %ctx.actor, "document stored");
        Ok(applied)
    }

    /// Lock-free snapshot of a document
    pub fn document(&self, doc_id: &DocId) -> StoreResult<Document> {
        self.load_verified(doc_id)
    }

    pub fn list_documents(&self) -> StoreResult<Vec<DocId>> {
        self.store.list()
    }

    /// Documents on which `user` holds an active record
    pub fn documents_for(&self, user: &UserId) -> StoreResult<Vec<Document>> {
        let mut found = Vec::new();
        for doc_id in self.store.list()? {
            let document = self.load_verified(&doc_id)?;
            if document.collaborators().active_record(user).is_some() {
                found.push(document);
            }
        }
        Ok(found)
    }

    // ========== Reads ==========

    pub fn authorize(&self, doc_id: &DocId, actor: &UserId, action: &Action<'_>) -> StoreResult<Decision> {
        Ok(self.load_verified(doc_id)?.authorize(actor, action))
    }

    pub fn diff(
        &self,
        doc_id: &DocId,
        actor: &UserId,
        from: &VersionId,
        to: &VersionId,
    ) -> StoreResult<VersionDiff> {
        Ok(self.load_verified(doc_id)?.diff(actor, from, to)?)
    }

    // ========== Collaborators ==========

    pub fn add_collaborator(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        new: NewCollaborator,
    ) -> StoreResult<Outcome<CollaboratorId>> {
        let operation = json!({ "op": "addCollaborator", "collaborator": &new });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| doc.add_collaborator(ctx, new))
    }

    pub fn remove_collaborator(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        target: CollaboratorId,
    ) -> StoreResult<Outcome<()>> {
        let operation = json!({ "op": "removeCollaborator", "target": target });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| doc.remove_collaborator(ctx, target))
    }

    pub fn update_role(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        target: CollaboratorId,
        role: CollaboratorRole,
    ) -> StoreResult<Outcome<()>> {
        let operation = json!({ "op": "updateRole", "target": target, "role": role });
        self.mutate(doc_id, ctx, operation, |doc, ctx, policy| {
            doc.update_role(ctx, target, role, policy)
        })
    }

    pub fn update_permission(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        target: CollaboratorId,
        permission: PermissionLevel,
    ) -> StoreResult<Outcome<()>> {
        let operation = json!({ "op": "updatePermission", "target": target, "permission": permission });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| {
            doc.update_permission(ctx, target, permission)
        })
    }

    pub fn promote_to_primary(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        target: CollaboratorId,
    ) -> StoreResult<Outcome<()>> {
        let operation = json!({ "op": "promoteToPrimary", "target": target });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| doc.promote_to_primary(ctx, target))
    }

    pub fn leave(&self, doc_id: &DocId, ctx: &ActionContext) -> StoreResult<Outcome<()>> {
        self.mutate(doc_id, ctx, json!({ "op": "leave" }), |doc, ctx, _| doc.leave(ctx))
    }

    /// Stamp the user's last access. Emits no events.
    pub fn record_access(&self, doc_id: &DocId, user: &UserId, at: DateTime<Utc>) -> StoreResult<()> {
        let slot = self.slot(doc_id)?;
        let _guard = slot.lock().map_err(poisoned)?;

        let mut document = self.load_verified(doc_id)?;
        document.record_access(user, at)?;
        self.store.save(&document)
    }

    // ========== Lifecycle ==========

    pub fn transition(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        event: LifecycleEvent,
    ) -> StoreResult<Outcome<DocumentStatus>> {
        let operation = json!({ "op": "transition", "event": &event });
        self.mutate(doc_id, ctx, operation, |doc, ctx, policy| {
            doc.apply_lifecycle(ctx, event, policy)
        })
    }

    pub fn submit(&self, doc_id: &DocId, ctx: &ActionContext) -> StoreResult<Outcome<DocumentStatus>> {
        self.transition(doc_id, ctx, LifecycleEvent::Submit)
    }

    pub fn approve(&self, doc_id: &DocId, ctx: &ActionContext) -> StoreResult<Outcome<DocumentStatus>> {
        self.transition(doc_id, ctx, LifecycleEvent::Approve)
    }

    pub fn request_revision(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        reason: &str,
    ) -> StoreResult<Outcome<DocumentStatus>> {
        self.transition(
            doc_id,
            ctx,
            LifecycleEvent::RequestRevision {
                reason: reason.to_string(),
            },
        )
    }

    pub fn finalize(&self, doc_id: &DocId, ctx: &ActionContext) -> StoreResult<Outcome<DocumentStatus>> {
        self.transition(doc_id, ctx, LifecycleEvent::Finalize)
    }

    // ========== Versions and comments ==========

    pub fn create_version(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        content: &str,
        commit_message: &str,
    ) -> StoreResult<Outcome<VersionId>> {
        let operation = json!({
            "op": "createVersion",
            "content": content,
            "commitMessage": commit_message,
        });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| {
            doc.create_version(ctx, content, commit_message)
        })
    }

    pub fn add_comment(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        version_id: VersionId,
        span: Option<CommentSpan>,
        content: &str,
    ) -> StoreResult<Outcome<CommentId>> {
        let operation = json!({
            "op": "addComment",
            "versionId": version_id,
            "span": span,
            "content": content,
        });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| {
            doc.add_comment(ctx, version_id, span, content)
        })
    }

    pub fn reply(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        parent: CommentId,
        content: &str,
    ) -> StoreResult<Outcome<CommentId>> {
        let operation = json!({ "op": "reply", "parentId": parent, "content": content });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| doc.reply(ctx, parent, content))
    }

    pub fn edit_comment(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        comment_id: CommentId,
        content: &str,
    ) -> StoreResult<Outcome<()>> {
        let operation = json!({ "op": "editComment", "commentId": comment_id, "content": content });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| {
            doc.edit_comment(ctx, comment_id, content)
        })
    }

    pub fn resolve_comment(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        comment_id: CommentId,
    ) -> StoreResult<Outcome<()>> {
        let operation = json!({ "op": "resolveComment", "commentId": comment_id });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| doc.resolve_comment(ctx, comment_id))
    }

    pub fn delete_comment(
        &self,
        doc_id: &DocId,
        ctx: &ActionContext,
        comment_id: CommentId,
    ) -> StoreResult<Outcome<()>> {
        let operation = json!({ "op": "deleteComment", "commentId": comment_id });
        self.mutate(doc_id, ctx, operation, |doc, ctx, _| doc.delete_comment(ctx, comment_id))
    }
}
