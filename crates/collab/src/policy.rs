//! Product policy knobs that the collaboration rules consult.

use serde::{Deserialize, Serialize};

/// Who may close out an approved document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinalizePolicy {
    /// An Advisor-category collaborator with write access
    #[default]
    AdvisorOnly,
    /// As above, or any collaborator who can manage collaborators
    AdvisorOrManager,
}

/// Policy applied by the collaborator set and the lifecycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationPolicy {
    /// Allow `update_role` to move a collaborator into another category
    pub allow_cross_category_role_change: bool,
    /// Guard for the Finalize transition
    pub finalize: FinalizePolicy,
}

impl Default for CollaborationPolicy {
    fn default() -> Self {
        Self {
            allow_cross_category_role_change: false,
            finalize: FinalizePolicy::AdvisorOnly,
        }
    }
}
