//! # warden-auth
//!
//! Authorization and token engine for the Warden identity provider.
//!
//! ## Flow
//!
//! A user authenticates into the [`session`] store, the
//! [`PermissionGate`](oauth::PermissionGate) authorizes the (user, client)
//! pair, the [`AuthorizationCodeManager`](oauth::AuthorizationCodeManager)
//! issues a code, the client exchanges it at the token endpoint, and the
//! [`TokenEngine`](token::TokenEngine) mints tokens signed by the
//! [`KeyMaterialProvider`](keys::KeyMaterialProvider).
//!
//! ## Modules
//!
//! - [`config`] - engine configuration
//! - [`keys`] - signing keys and the published key set
//! - [`oauth`] - client registry, permission gate, codes, PKCE, grants
//! - [`token`] - token claims, minting, verification, refresh rotation
//! - [`session`] - administrative and public sessions
//! - [`storage`] - persistence traits
//! - [`http`] - axum handlers
//!
//! Components hold no mutable state of their own. Every record lives
//! behind a [`storage`] trait; the only atomic operations required of a
//! backend are the two `consume` calls.

pub mod config;
pub mod deadline;
pub mod error;
pub mod http;
pub mod keys;
pub mod oauth;
pub mod secret;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::{AuthConfig, ConfigError, OAuthConfig, SessionConfig, SigningConfig};
pub use error::{AuthError, ErrorCategory};
pub use http::{AuthState, PresentedSession, router};
pub use keys::{Jwk, Jwks, KeyError, KeyMaterialProvider, SigningAlgorithm};
pub use oauth::{
    AuthorizationCodeManager, ClientRegistry, CodeSettings, GrantService, NewClient,
    PermissionGate,
};
pub use session::{IssuedSession, SessionStore, ValidatedSession};
pub use storage::{
    AuthorizationCodeStorage, ClientStorage, PermissionStorage, RefreshTokenStorage,
    SessionStorage, UserStorage,
};
pub use token::{Claims, TokenEngine, TokenSet, TokenSettings};
pub use types::{Client, GrantType, Scope, SessionKind, User};

/// Type alias for engine results.
pub type AuthResult<T> = Result<T, AuthError>;
