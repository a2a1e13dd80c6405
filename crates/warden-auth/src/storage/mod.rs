//! Storage traits for every record the engine reads or writes.
//!
//! The core components are stateless; all coordination happens through
//! these traits. The two operations that must be compare-and-set,
//! [`AuthorizationCodeStorage::consume`] and
//! [`RefreshTokenStorage::consume`], are expressed as single calls so a
//! backend can implement each as one conditional update.
//!
//! # Implementations
//!
//! - `warden-auth-memory`: in-process, for tests and development
//! - `warden-auth-postgres`: PostgreSQL

pub mod client;
pub mod code;
pub mod permission;
pub mod refresh;
pub mod session;
pub mod user;

pub use client::ClientStorage;
pub use code::AuthorizationCodeStorage;
pub use permission::PermissionStorage;
pub use refresh::RefreshTokenStorage;
pub use session::SessionStorage;
pub use user::UserStorage;
