//! Client registration storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{Client, ClientStatus};

/// Persistence for OAuth client registrations.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Finds a client by its identifier, regardless of status.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Stores a new client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the client id is taken.
    async fn create(&self, client: &Client) -> AuthResult<()>;

    /// Sets the status of a client. Returns `false` if no such client.
    async fn set_status(&self, client_id: &str, status: ClientStatus) -> AuthResult<bool>;

    /// Replaces the stored secret hash. Returns `false` if no such client.
    async fn set_secret_hash(&self, client_id: &str, secret_hash: &str) -> AuthResult<bool>;

    /// Lists clients ordered by id.
    async fn list(&self, limit: i64, offset: i64) -> AuthResult<Vec<Client>>;
}
