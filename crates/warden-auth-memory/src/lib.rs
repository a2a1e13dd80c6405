//! In-memory storage backend for the Warden authorization engine.
//!
//! Implements every `warden_auth::storage` trait on one
//! [`InMemoryAuthStorage`], built on `dashmap`. State is lost on restart;
//! use it for tests and local development.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden_auth_memory::InMemoryAuthStorage;
//!
//! let storage = Arc::new(InMemoryAuthStorage::new());
//! let registry = ClientRegistry::new(storage.clone(), timeout);
//! let gate = PermissionGate::new(storage.clone(), timeout);
//! ```

pub mod storage;

pub use storage::InMemoryAuthStorage;

/// Creates a shareable in-memory store.
#[must_use]
pub fn create_auth_storage() -> std::sync::Arc<InMemoryAuthStorage> {
    std::sync::Arc::new(InMemoryAuthStorage::new())
}
