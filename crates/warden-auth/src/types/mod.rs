//! Domain records owned by the persistence layer.

pub mod client;
pub mod code;
pub mod permission;
pub mod refresh;
pub mod scope;
pub mod session;
pub mod user;

pub use client::{Client, ClientStatus, ClientValidationError, GrantType};
pub use code::AuthorizationCode;
pub use permission::{Eligibility, Permission, PermissionStatus};
pub use refresh::RefreshTokenRecord;
pub use scope::Scope;
pub use session::{Session, SessionKind};
pub use user::User;
