//! Identity directory records used for ID token claims.

use serde::{Deserialize, Serialize};

/// An end-user identity.
///
/// `email` is unique across the directory, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier, used as the token subject.
    pub id: String,

    /// Primary email address.
    pub email: String,

    /// Whether the email address has been verified.
    pub email_verified: bool,

    /// Display name.
    pub name: Option<String>,

    /// Preferred username.
    pub preferred_username: Option<String>,
}

impl User {
    /// Lower-cased email used for uniqueness checks.
    #[must_use]
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}
