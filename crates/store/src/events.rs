//! Delivery of committed domain events.

use std::sync::Mutex;
use thesis_collab::DomainEvent;

/// Receives the ordered events of each committed mutation.
///
/// Called after the new state is saved and before the document lock is
/// released, so events for one document arrive in commit order.
pub trait EventSink: Send + Sync {
    fn publish(&self, events: &[DomainEvent]);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _events: &[DomainEvent]) {}
}

/// Keeps every event in memory, for tests and in-process consumers
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order
    pub fn events(&self) -> Vec<DomainEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Remove and return everything published so far
    pub fn drain(&self) -> Vec<DomainEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, events: &[DomainEvent]) {
        let mut guard = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.extend_from_slice(events);
    }
}
