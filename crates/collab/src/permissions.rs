//! Role and permission registry.
//!
//! Static catalog of collaborator roles, the category each role belongs to,
//! and the ordering between permission levels. Nothing here holds state.

use serde::{Deserialize, Serialize};

/// Grouping of roles used for the one-primary-per-category rule
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleCategory {
    Student,
    Advisor,
    Other,
}

impl RoleCategory {
    /// The primary role of this category, if the category has one
    pub fn primary_role(&self) -> Option<CollaboratorRole> {
        match self {
            RoleCategory::Student => Some(CollaboratorRole::PrimaryStudent),
            RoleCategory::Advisor => Some(CollaboratorRole::PrimaryAdvisor),
            RoleCategory::Other => None,
        }
    }

    /// The role a demoted primary of this category falls back to
    pub fn secondary_role(&self) -> Option<CollaboratorRole> {
        match self {
            RoleCategory::Student => Some(CollaboratorRole::SecondaryStudent),
            RoleCategory::Advisor => Some(CollaboratorRole::SecondaryAdvisor),
            RoleCategory::Other => None,
        }
    }

    /// Whether this category requires exactly one active primary
    pub fn has_primary(&self) -> bool {
        self.primary_role().is_some()
    }
}

impl std::fmt::Display for RoleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoleCategory::Student => "Student",
            RoleCategory::Advisor => "Advisor",
            RoleCategory::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Role a collaborator holds on a document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaboratorRole {
    PrimaryStudent,
    SecondaryStudent,
    CoStudent,
    PrimaryAdvisor,
    SecondaryAdvisor,
    CoAdvisor,
    ExternalAdvisor,
    Examiner,
    Reviewer,
    Observer,
}

impl CollaboratorRole {
    pub const ALL: [CollaboratorRole; 10] = [
        CollaboratorRole::PrimaryStudent,
        CollaboratorRole::SecondaryStudent,
        CollaboratorRole::CoStudent,
        CollaboratorRole::PrimaryAdvisor,
        CollaboratorRole::SecondaryAdvisor,
        CollaboratorRole::CoAdvisor,
        CollaboratorRole::ExternalAdvisor,
        CollaboratorRole::Examiner,
        CollaboratorRole::Reviewer,
        CollaboratorRole::Observer,
    ];

    /// Category this role belongs to
    pub fn category(&self) -> RoleCategory {
        match self {
            CollaboratorRole::PrimaryStudent
            | CollaboratorRole::SecondaryStudent
            | CollaboratorRole::CoStudent => RoleCategory::Student,
            CollaboratorRole::PrimaryAdvisor
            | CollaboratorRole::SecondaryAdvisor
            | CollaboratorRole::CoAdvisor
            | CollaboratorRole::ExternalAdvisor => RoleCategory::Advisor,
            CollaboratorRole::Examiner | CollaboratorRole::Reviewer | CollaboratorRole::Observer => {
                RoleCategory::Other
            }
        }
    }

    /// Whether this is the primary role of its category
    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            CollaboratorRole::PrimaryStudent | CollaboratorRole::PrimaryAdvisor
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollaboratorRole::PrimaryStudent => "PRIMARY_STUDENT",
            CollaboratorRole::SecondaryStudent => "SECONDARY_STUDENT",
            CollaboratorRole::CoStudent => "CO_STUDENT",
            CollaboratorRole::PrimaryAdvisor => "PRIMARY_ADVISOR",
            CollaboratorRole::SecondaryAdvisor => "SECONDARY_ADVISOR",
            CollaboratorRole::CoAdvisor => "CO_ADVISOR",
            CollaboratorRole::ExternalAdvisor => "EXTERNAL_ADVISOR",
            CollaboratorRole::Examiner => "EXAMINER",
            CollaboratorRole::Reviewer => "REVIEWER",
            CollaboratorRole::Observer => "OBSERVER",
        }
    }
}

impl std::fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission levels in order of increasing access
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    /// Can view the document
    ReadOnly,
    /// Can view and comment
    ReadComment,
    /// Can edit content and create versions
    ReadWrite,
    /// Full control including collaborator management
    FullAccess,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 4] = [
        PermissionLevel::ReadOnly,
        PermissionLevel::ReadComment,
        PermissionLevel::ReadWrite,
        PermissionLevel::FullAccess,
    ];

    /// Position in the total order
    pub fn rank(&self) -> u8 {
        match self {
            PermissionLevel::ReadOnly => 0,
            PermissionLevel::ReadComment => 1,
            PermissionLevel::ReadWrite => 2,
            PermissionLevel::FullAccess => 3,
        }
    }

    /// Check if this level satisfies `threshold`
    pub fn at_least(&self, threshold: PermissionLevel) -> bool {
        self.rank() >= threshold.rank()
    }

    pub fn can_read(&self) -> bool {
        self.at_least(PermissionLevel::ReadOnly)
    }

    pub fn can_comment(&self) -> bool {
        self.at_least(PermissionLevel::ReadComment)
    }

    pub fn can_write(&self) -> bool {
        self.at_least(PermissionLevel::ReadWrite)
    }

    pub fn can_manage(&self) -> bool {
        *self == PermissionLevel::FullAccess
    }
}

impl PartialOrd for PermissionLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PermissionLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PermissionLevel::ReadOnly => "READ_ONLY",
            PermissionLevel::ReadComment => "READ_COMMENT",
            PermissionLevel::ReadWrite => "READ_WRITE",
            PermissionLevel::FullAccess => "FULL_ACCESS",
        };
        f.write_str(name)
    }
}

/// Category of `role`
pub fn category_of(role: CollaboratorRole) -> RoleCategory {
    role.category()
}

/// Whether `role` is a primary role
pub fn is_primary_role(role: CollaboratorRole) -> bool {
    role.is_primary()
}

/// Rank of `permission` in the total order
pub fn rank(permission: PermissionLevel) -> u8 {
    permission.rank()
}

/// Whether `permission` is at least `threshold`
pub fn at_least(permission: PermissionLevel, threshold: PermissionLevel) -> bool {
    permission.at_least(threshold)
}
