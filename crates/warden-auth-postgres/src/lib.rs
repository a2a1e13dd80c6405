//! PostgreSQL storage backend for the Warden authorization engine.
//!
//! Provides persistent storage for:
//!
//! - OAuth clients
//! - Authorization codes (by digest)
//! - Refresh token chains
//! - Administrative and public sessions
//! - Per-(user, client) permissions
//! - The identity directory
//!
//! The two compare-and-set operations, code redemption and refresh token
//! consumption, are single conditional `UPDATE ... RETURNING` statements.
//!
//! # Example
//!
//! ```ignore
//! use warden_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/warden", 10).await?;
//! storage.migrate().await?;
//! let registry = ClientRegistry::new(Arc::new(storage.clone()), timeout);
//! ```

pub mod client;
pub mod code;
pub mod migrations;
pub mod permission;
pub mod refresh;
pub mod session;
pub mod user;

use std::sync::Arc;

use sqlx_core::pool::{Pool, PoolOptions};
use sqlx_postgres::Postgres;
use warden_auth::AuthError;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Resource already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The row refers to a user, client or chain that does not exist.
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// A stored row holds a value the engine does not recognize.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidRow` error.
    #[must_use]
    pub fn invalid_row(message: impl Into<String>) -> Self {
        Self::InvalidRow(message.into())
    }

    /// Maps an insert failure, turning a unique violation into `Conflict`
    /// and a foreign key violation into `MissingReference`.
    #[must_use]
    pub fn from_insert(error: sqlx_core::Error, conflict: impl FnOnce() -> String) -> Self {
        if let sqlx_core::Error::Database(ref db_err) = error {
            if db_err.is_unique_violation() {
                return Self::Conflict(conflict());
            }
            if db_err.is_foreign_key_violation() {
                return Self::MissingReference(db_err.message().to_string());
            }
        }
        Self::Database(error)
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Conflict(message) => AuthError::conflict(message),
            StorageError::MissingReference(message) => {
                tracing::warn!(cause = %message, "Write refers to a missing record");
                AuthError::invalid_request("the referenced user or client does not exist")
            }
            other => AuthError::storage(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL backend implementing every `warden_auth::storage` trait.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `Migration` if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
