//! OAuth 2.0 authorization server components.
//!
//! - [`registry`] - client identities and credential verification
//! - [`permission`] - per-(identity, client) grant eligibility
//! - [`pkce`] - PKCE challenge/verifier
//! - [`code`] - single-use authorization codes
//! - [`grant`] - token endpoint grant processing
//!
//! # Example
//!
//! ```ignore
//! let verifier = PkceVerifier::generate();
//! let issued = codes.issue_code(CodeRequest {
//!     client_id, user_id, redirect_uri,
//!     scope: Scope::parse("openid profile"),
//!     pkce: Some(PkceChallenge::from_verifier(&verifier)),
//!     nonce: None,
//!     auth_time: None,
//! }).await?;
//! ```

pub mod code;
pub mod grant;
pub mod permission;
pub mod pkce;
pub mod registry;

pub use code::{
    AuthorizationCodeManager, CodeRequest, CodeSettings, IssuedCode, RedeemRequest, RedeemedGrant,
};
pub use grant::{ClientCredentials, CodeExchange, GrantService};
pub use permission::PermissionGate;
pub use pkce::{PkceChallenge, PkceError, PkceMethod, PkceVerifier};
pub use registry::{ClientRegistry, NewClient, RegisteredClient};
