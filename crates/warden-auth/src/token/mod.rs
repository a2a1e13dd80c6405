//! Token minting and verification.
//!
//! - Access, ID and refresh tokens are JWS signed by the
//!   [`KeyMaterialProvider`](crate::keys::KeyMaterialProvider)
//! - Refresh tokens rotate: each redemption consumes the presented token's
//!   chain entry and mints a successor in the same chain

pub mod claims;
pub mod engine;

pub use claims::{AccessClaims, Claims, IdClaims, RefreshClaims, TokenKind};
pub use engine::{MintedToken, TokenEngine, TokenSet, TokenSettings};
