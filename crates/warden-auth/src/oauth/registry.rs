//! Client registry.
//!
//! Stores and verifies client identities. Two read paths exist:
//!
//! - [`ClientRegistry::lookup_client`] loads a client without credentials,
//!   for validating authorization requests before any secret is exchanged.
//! - [`ClientRegistry::verify_client`] checks credentials and status, for
//!   the token endpoint.
//!
//! Secrets are Argon2id hashes; verification runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::deadline::with_deadline;
use crate::error::AuthError;
use crate::secret::{generate_client_secret, hash_client_secret, verify_client_secret};
use crate::storage::ClientStorage;
use crate::types::{Client, ClientStatus, GrantType};

/// Registration input.
#[derive(Debug, Clone)]
pub struct NewClient {
    /// Display name.
    pub name: String,
    /// Exact-match redirect URI allow-list.
    pub redirect_uris: Vec<String>,
    /// Allowed scopes; empty allows any.
    pub allowed_scopes: Vec<String>,
    /// Allowed grant types.
    pub grant_types: Vec<GrantType>,
    /// Whether to issue a client secret.
    pub confidential: bool,
    /// Whether PKCE is mandatory. Forced on for public clients.
    pub pkce_required: bool,
}

/// A freshly registered client and its one-time plaintext secret.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    /// The stored registration.
    pub client: Client,
    /// Plaintext secret for confidential clients. Not recoverable later.
    pub client_secret: Option<String>,
}

/// Stores and verifies OAuth client identities.
pub struct ClientRegistry {
    storage: Arc<dyn ClientStorage>,
    timeout: Duration,
}

impl ClientRegistry {
    /// Creates a registry over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Registers a new client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the registration breaks a client rule.
    pub async fn register(&self, new_client: NewClient) -> AuthResult<RegisteredClient> {
        let (client_secret, secret_hash) = if new_client.confidential {
            let secret = generate_client_secret();
            let hash = hash_secret_blocking(secret.clone()).await?;
            (Some(secret), Some(hash))
        } else {
            (None, None)
        };

        let now = OffsetDateTime::now_utc();
        let client = Client {
            client_id: uuid::Uuid::new_v4().to_string(),
            secret_hash,
            name: new_client.name,
            redirect_uris: new_client.redirect_uris,
            allowed_scopes: new_client.allowed_scopes,
            grant_types: new_client.grant_types,
            pkce_required: new_client.pkce_required || !new_client.confidential,
            status: ClientStatus::Active,
            created_at: now,
            updated_at: now,
        };
        client
            .validate()
            .map_err(|e| AuthError::invalid_request(e.to_string()))?;

        with_deadline(self.timeout, "client.create", self.storage.create(&client)).await?;
        tracing::info!(
            client_id = %client.client_id,
            public = client.is_public(),
            "Client registered"
        );

        Ok(RegisteredClient {
            client,
            client_secret,
        })
    }

    /// Loads a client by id without checking credentials or status.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the client does not exist.
    pub async fn lookup_client(&self, client_id: &str) -> AuthResult<Client> {
        with_deadline(
            self.timeout,
            "client.find",
            self.storage.find_by_client_id(client_id),
        )
        .await?
        .ok_or_else(|| AuthError::invalid_client(format!("unknown client '{client_id}'")))
    }

    /// Checks credentials without the status gate.
    ///
    /// Revoked clients authenticate here so they can still be inspected.
    /// Confidential clients must present their secret; public clients must
    /// present none.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` for unknown clients or bad credentials.
    pub async fn authenticate(
        &self,
        client_id: &str,
        presented_secret: Option<&str>,
    ) -> AuthResult<Client> {
        let client = self.lookup_client(client_id).await?;

        match (&client.secret_hash, presented_secret) {
            (Some(hash), Some(secret)) => {
                if !verify_secret_blocking(secret.to_string(), hash.clone()).await? {
                    return Err(AuthError::invalid_client(format!(
                        "secret mismatch for '{client_id}'"
                    )));
                }
            }
            (Some(_), None) => {
                return Err(AuthError::invalid_client(format!(
                    "confidential client '{client_id}' presented no secret"
                )));
            }
            (None, Some(_)) => {
                return Err(AuthError::invalid_client(format!(
                    "public client '{client_id}' presented a secret"
                )));
            }
            (None, None) => {}
        }

        Ok(client)
    }

    /// Checks credentials and that the client may complete new grants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` for unknown clients or bad credentials, and
    /// `ClientRevoked` for a correctly authenticated revoked client.
    pub async fn verify_client(
        &self,
        client_id: &str,
        presented_secret: Option<&str>,
    ) -> AuthResult<Client> {
        let client = self.authenticate(client_id, presented_secret).await?;
        if !client.is_active() {
            tracing::info!(client_id, "Revoked client attempted a grant");
            return Err(AuthError::client_revoked(client_id));
        }
        Ok(client)
    }

    /// Disables a client. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the client does not exist.
    pub async fn revoke_client(&self, client_id: &str) -> AuthResult<()> {
        let found = with_deadline(
            self.timeout,
            "client.set_status",
            self.storage.set_status(client_id, ClientStatus::Revoked),
        )
        .await?;
        if !found {
            return Err(AuthError::invalid_client(format!(
                "unknown client '{client_id}'"
            )));
        }
        tracing::info!(client_id, "Client revoked");
        Ok(())
    }

    /// Issues a new secret for a confidential client, invalidating the old one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the client does not exist or is public.
    pub async fn rotate_secret(&self, client_id: &str) -> AuthResult<String> {
        let client = self.lookup_client(client_id).await?;
        if client.is_public() {
            return Err(AuthError::invalid_client(format!(
                "public client '{client_id}' has no secret"
            )));
        }

        let secret = generate_client_secret();
        let hash = hash_secret_blocking(secret.clone()).await?;
        with_deadline(
            self.timeout,
            "client.set_secret_hash",
            self.storage.set_secret_hash(client_id, &hash),
        )
        .await?;
        tracing::info!(client_id, "Client secret rotated");
        Ok(secret)
    }

    /// Lists registered clients.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn list(&self, limit: i64, offset: i64) -> AuthResult<Vec<Client>> {
        with_deadline(self.timeout, "client.list", self.storage.list(limit, offset)).await
    }
}

async fn hash_secret_blocking(secret: String) -> AuthResult<String> {
    tokio::task::spawn_blocking(move || hash_client_secret(&secret))
        .await
        .map_err(|e| AuthError::internal(format!("secret hashing task failed: {e}")))?
        .map_err(|e| AuthError::internal(format!("secret hashing failed: {e}")))
}

async fn verify_secret_blocking(secret: String, hash: String) -> AuthResult<bool> {
    tokio::task::spawn_blocking(move || verify_client_secret(&secret, &hash))
        .await
        .map_err(|e| AuthError::internal(format!("secret verification task failed: {e}")))?
        .map_err(|e| AuthError::internal(format!("stored secret hash is malformed: {e}")))
}
