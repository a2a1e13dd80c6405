//! Token endpoint grant processing.
//!
//! Composes client verification, code redemption, and token minting:
//!
//! ```text
//! authorization_code: verify_client ─► redeem_code ─► issue_for_grant
//! refresh_token:      verify_client ─► rotate_refresh_token
//! ```

use std::sync::Arc;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::code::{AuthorizationCodeManager, RedeemRequest};
use crate::oauth::registry::ClientRegistry;
use crate::token::{TokenEngine, TokenSet};
use crate::types::{GrantType, Scope};

/// Client credentials presented at the token endpoint.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// Client identifier.
    pub client_id: String,
    /// Client secret; absent for public clients.
    pub client_secret: Option<String>,
}

/// Parameters of an `authorization_code` grant.
#[derive(Debug, Clone)]
pub struct CodeExchange {
    /// The authorization code.
    pub code: String,
    /// Redirect URI used in the authorization request.
    pub redirect_uri: String,
    /// PKCE verifier.
    pub code_verifier: Option<String>,
}

/// Handles the grants accepted by the token endpoint.
pub struct GrantService {
    clients: Arc<ClientRegistry>,
    codes: Arc<AuthorizationCodeManager>,
    tokens: Arc<TokenEngine>,
}

impl GrantService {
    /// Creates a grant service.
    #[must_use]
    pub fn new(
        clients: Arc<ClientRegistry>,
        codes: Arc<AuthorizationCodeManager>,
        tokens: Arc<TokenEngine>,
    ) -> Self {
        Self {
            clients,
            codes,
            tokens,
        }
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient`/`ClientRevoked` for client failures,
    /// `InvalidGrant` for any code failure, `AccessDenied` if the
    /// permission was revoked since issuance.
    pub async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        exchange: &CodeExchange,
    ) -> AuthResult<TokenSet> {
        let client = self
            .clients
            .verify_client(&credentials.client_id, credentials.client_secret.as_deref())
            .await?;

        let grant = self
            .codes
            .redeem_code(RedeemRequest {
                code: &exchange.code,
                client_id: &client.client_id,
                redirect_uri: &exchange.redirect_uri,
                code_verifier: exchange.code_verifier.as_deref(),
            })
            .await?;

        self.tokens.issue_for_grant(&grant, &client).await
    }

    /// Rotates a refresh token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient`/`ClientRevoked` for client failures,
    /// `InvalidGrant` for an unusable refresh token, `InvalidScope` for a
    /// widened scope, `AccessDenied` if the permission was revoked.
    pub async fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
        scope: Option<&Scope>,
    ) -> AuthResult<TokenSet> {
        let client = self
            .clients
            .verify_client(&credentials.client_id, credentials.client_secret.as_deref())
            .await?;
        if !client.is_grant_type_allowed(GrantType::RefreshToken) {
            return Err(AuthError::invalid_grant(format!(
                "client '{}' may not use the refresh_token grant",
                client.client_id
            )));
        }

        self.tokens
            .rotate_refresh_token(refresh_token, &client, scope)
            .await
    }
}
