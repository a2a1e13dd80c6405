//! Per-(identity, client) permission records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Lifecycle status of a permission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// Access has been requested but not decided.
    Pending,
    /// Access has been approved.
    Approved,
    /// Access is approved and in use.
    Active,
    /// Access has been withdrawn.
    Revoked,
}

impl PermissionStatus {
    /// Returns the status as stored.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }

    /// Parses a stored status value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "active" => Some(Self::Active),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    /// Returns `true` for the statuses that allow a grant.
    #[must_use]
    pub fn allows_grant(&self) -> bool {
        matches!(self, Self::Approved | Self::Active)
    }
}

/// Whether `user_id` may complete grants for `client_id`, and in what role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Identity the record applies to.
    pub user_id: String,

    /// Client the record applies to.
    pub client_id: String,

    /// Explicit access flag. Required; never inferred.
    pub access: bool,

    /// Role within the client application.
    pub role: String,

    /// Lifecycle status.
    pub status: PermissionStatus,

    /// When access was first requested.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub requested_at: Option<OffsetDateTime>,

    /// When access was last granted.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub granted_at: Option<OffsetDateTime>,

    /// Actor that last granted access.
    pub granted_by: Option<String>,

    /// When access was last revoked.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,

    /// Actor that last revoked access.
    pub revoked_by: Option<String>,

    /// Last modification.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Permission {
    /// Effective only when the flag is set and the status allows grants.
    #[must_use]
    pub fn is_effective(&self) -> bool {
        self.access && self.status.allows_grant()
    }
}

/// Result of a grant-eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    /// Whether a grant may be completed.
    pub eligible: bool,

    /// Role from the permission record, when eligible.
    pub role: Option<String>,
}

impl Eligibility {
    /// An ineligible result.
    #[must_use]
    pub fn denied() -> Self {
        Self {
            eligible: false,
            role: None,
        }
    }
}
