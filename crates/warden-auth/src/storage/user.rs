//! Identity directory storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::User;

/// Read access to end-user identities.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by id.
    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>>;

    /// Finds a user by email, case-insensitively.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Stores a new user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the id or the email is taken.
    async fn create(&self, user: &User) -> AuthResult<()>;
}
