//! OpenID Connect discovery document.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use serde::Serialize;

use super::{AUTHORIZE_PATH, AuthState, JWKS_PATH, TOKEN_PATH};

/// Subset of the OpenID Provider Metadata this server supports.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier.
    pub issuer: String,
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Key set URL.
    pub jwks_uri: String,
    /// Supported `response_type` values.
    pub response_types_supported: Vec<&'static str>,
    /// Supported grant types.
    pub grant_types_supported: Vec<&'static str>,
    /// Supported subject identifier types.
    pub subject_types_supported: Vec<&'static str>,
    /// Scopes with defined claim mappings.
    pub scopes_supported: Vec<&'static str>,
    /// Claims that may appear in ID tokens.
    pub claims_supported: Vec<&'static str>,
    /// ID token signing algorithms.
    pub id_token_signing_alg_values_supported: Vec<&'static str>,
    /// Client authentication methods at the token endpoint.
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    /// PKCE methods.
    pub code_challenge_methods_supported: Vec<&'static str>,
}

impl DiscoveryDocument {
    /// Builds the document for an issuer.
    #[must_use]
    pub fn build(issuer: &str, signing_alg: &'static str, allow_plain_pkce: bool) -> Self {
        let base = issuer.trim_end_matches('/');
        let mut pkce_methods = vec!["S256"];
        if allow_plain_pkce {
            pkce_methods.push("plain");
        }

        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{base}{AUTHORIZE_PATH}"),
            token_endpoint: format!("{base}{TOKEN_PATH}"),
            jwks_uri: format!("{base}{JWKS_PATH}"),
            response_types_supported: vec!["code"],
            grant_types_supported: vec!["authorization_code", "refresh_token"],
            subject_types_supported: vec!["public"],
            scopes_supported: vec!["openid", "profile", "email"],
            claims_supported: vec![
                "iss",
                "sub",
                "aud",
                "exp",
                "iat",
                "nonce",
                "auth_time",
                "name",
                "preferred_username",
                "email",
                "email_verified",
            ],
            id_token_signing_alg_values_supported: vec![signing_alg],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic",
                "client_secret_post",
                "none",
            ],
            code_challenge_methods_supported: pkce_methods,
        }
    }
}

/// Handler for `GET /.well-known/openid-configuration`.
pub async fn discovery_handler(State(state): State<AuthState>) -> impl IntoResponse {
    let document = DiscoveryDocument::build(
        state.tokens.issuer(),
        state.keys.algorithm().as_str(),
        state.codes.allows_plain_pkce(),
    );
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(document),
    )
}
