//! Domain events emitted by successful mutations.
//!
//! The core never delivers notifications. It hands back an ordered list of
//! events and the caller dispatches them after persisting the new state.

use crate::context::ActionContext;
use crate::ids::{DocId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a domain event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    DocumentCreated,
    CollaboratorAdded,
    CollaboratorRemoved,
    RoleChanged,
    PermissionChanged,
    PrimaryPromoted,
    DocumentSubmitted,
    DocumentApproved,
    RevisionRequested,
    DocumentFinalized,
    VersionCreated,
    CommentAdded,
    CommentEdited,
    CommentResolved,
    CommentDeleted,
}

/// Event payload consumed by the notification subsystem
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub document_id: DocId,
    pub actor_user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_user_id: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, document_id: &DocId, ctx: &ActionContext) -> Self {
        Self {
            kind,
            document_id: document_id.clone(),
            actor_user_id: ctx.actor.clone(),
            affected_user_id: None,
            timestamp: ctx.at,
            extra: Map::new(),
        }
    }

    pub fn affecting(mut self, user: &UserId) -> Self {
        self.affected_user_id = Some(user.clone());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Result of a successful mutation: its value plus the events it produced.
///
/// A replayed or no-op mutation carries an empty event list.
#[derive(Clone, Debug, PartialEq)]
pub struct Applied<T> {
    pub value: T,
    pub events: Vec<DomainEvent>,
}

impl<T> Applied<T> {
    pub fn new(value: T, events: Vec<DomainEvent>) -> Self {
        Self { value, events }
    }

    /// A mutation that changed nothing
    pub fn unchanged(value: T) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Applied<U> {
        Applied {
            value: f(self.value),
            events: self.events,
        }
    }
}
