//! Axum handlers for the external interfaces.
//!
//! # Routes
//!
//! - `GET /.well-known/jwks.json` - public key set
//! - `GET /.well-known/openid-configuration` - discovery document
//! - `GET /oauth/authorize` - authorization endpoint
//! - `POST /oauth/token` - token endpoint
//!
//! The authorization endpoint never parses cookies. The host extracts the
//! caller's public session token and inserts it as a [`PresentedSession`]
//! request extension.

pub mod authorize;
pub mod discovery;
pub mod jwks;
pub mod token;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;

use crate::error::AuthError;
use crate::keys::KeyMaterialProvider;
use crate::oauth::code::AuthorizationCodeManager;
use crate::oauth::grant::GrantService;
use crate::oauth::registry::ClientRegistry;
use crate::session::SessionStore;
use crate::token::TokenEngine;

pub use authorize::{AuthorizeParams, authorize_handler};
pub use discovery::{DiscoveryDocument, discovery_handler};
pub use jwks::jwks_handler;
pub use token::{TokenParams, token_handler};

/// Path of the key set document.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";
/// Path of the discovery document.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
/// Path of the authorization endpoint.
pub const AUTHORIZE_PATH: &str = "/oauth/authorize";
/// Path of the token endpoint.
pub const TOKEN_PATH: &str = "/oauth/token";

/// Opaque public session token extracted by the host.
#[derive(Debug, Clone)]
pub struct PresentedSession(pub String);

/// Shared state for every handler.
#[derive(Clone)]
pub struct AuthState {
    /// Signing and verification keys.
    pub keys: Arc<KeyMaterialProvider>,
    /// Client registry.
    pub clients: Arc<ClientRegistry>,
    /// Authorization code manager.
    pub codes: Arc<AuthorizationCodeManager>,
    /// Token engine.
    pub tokens: Arc<TokenEngine>,
    /// Session store.
    pub sessions: Arc<SessionStore>,
    /// Token endpoint grants.
    pub grants: Arc<GrantService>,
}

impl AuthState {
    /// Wires handler state from the core components.
    #[must_use]
    pub fn new(
        keys: Arc<KeyMaterialProvider>,
        clients: Arc<ClientRegistry>,
        codes: Arc<AuthorizationCodeManager>,
        tokens: Arc<TokenEngine>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let grants = Arc::new(GrantService::new(
            clients.clone(),
            codes.clone(),
            tokens.clone(),
        ));
        Self {
            keys,
            clients,
            codes,
            tokens,
            sessions,
            grants,
        }
    }
}

/// Builds the router for every endpoint.
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route(JWKS_PATH, get(jwks_handler))
        .route(DISCOVERY_PATH, get(discovery_handler))
        .route(AUTHORIZE_PATH, get(authorize_handler))
        .route(TOKEN_PATH, post(token_handler))
        .with_state(state)
}

/// Structured error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable description, free of internal causes.
    pub error_description: String,
}

impl ErrorBody {
    /// Builds the public body for `error`.
    #[must_use]
    pub fn from_error(error: &AuthError) -> Self {
        Self {
            error: error.oauth_error_code(),
            error_description: error.public_description(),
        }
    }
}

/// HTTP status for an error returned as a JSON body.
#[must_use]
pub fn status_for(error: &AuthError) -> StatusCode {
    match error.oauth_error_code() {
        "invalid_client" => StatusCode::UNAUTHORIZED,
        "temporarily_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// JSON error response with caching disabled.
pub(crate) fn json_error(status: StatusCode, error: &AuthError) -> Response {
    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(ErrorBody::from_error(error)),
    )
        .into_response()
}

#[cfg(test)]
pub(crate) mod test_http {
    use axum::body::Body;
    use axum::http::Response;
    use serde_json::Value;

    use super::*;
    use crate::test_support::Harness;

    pub fn app(h: &Harness) -> Router {
        router(AuthState::new(
            h.keys.clone(),
            h.clients.clone(),
            h.codes.clone(),
            h.tokens.clone(),
            h.sessions.clone(),
        ))
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
