//! Who is acting, when, and under which request id.

use crate::ids::{RequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Context supplied with every mutating operation.
///
/// All timestamps an operation writes are taken from `at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    /// Already-authenticated acting user
    pub actor: UserId,
    /// Time the action takes effect
    pub at: DateTime<Utc>,
    /// Correlation id for retried requests
    pub request_id: Option<RequestId>,
}

impl ActionContext {
    /// Context for `actor` stamped with the current time
    pub fn new(actor: impl Into<UserId>) -> Self {
        Self {
            actor: actor.into(),
            at: Utc::now(),
            request_id: None,
        }
    }

    /// Override the effective time
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    /// Attach a request id
    pub fn with_request_id(mut self, request_id: impl Into<RequestId>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
