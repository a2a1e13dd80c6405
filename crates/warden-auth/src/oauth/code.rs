//! Authorization code manager.
//!
//! Issues and redeems single-use codes binding an identity, a client, a
//! redirect URI, a scope, and an optional PKCE challenge.
//!
//! # Redemption order
//!
//! ```text
//! consume (atomic used=false -> true)
//!     └─► missing or already used ──────────────► invalid_grant
//! expiry, client id, redirect URI, PKCE
//!     └─► any mismatch ─────────────────────────► invalid_grant
//! permission re-check
//!     └─► revoked since issuance ───────────────► access_denied
//! ```
//!
//! The code is burned by the first step whatever happens afterwards. All
//! `invalid_grant` branches look identical to the caller; the specific
//! cause is logged.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::deadline::with_deadline;
use crate::error::AuthError;
use crate::oauth::permission::PermissionGate;
use crate::oauth::pkce::{PkceChallenge, PkceMethod};
use crate::oauth::registry::ClientRegistry;
use crate::secret::{generate_opaque_token, hash_opaque_token};
use crate::storage::AuthorizationCodeStorage;
use crate::types::{AuthorizationCode, GrantType, Scope};

/// Tunables for code issuance.
#[derive(Debug, Clone)]
pub struct CodeSettings {
    /// How long a code stays redeemable.
    pub lifetime: Duration,
    /// Whether the `plain` PKCE method is accepted.
    pub allow_plain_pkce: bool,
    /// Deadline for storage calls.
    pub storage_timeout: Duration,
}

/// Input for [`AuthorizationCodeManager::issue_code`].
#[derive(Debug, Clone)]
pub struct CodeRequest {
    /// Requesting client.
    pub client_id: String,
    /// Authenticated identity.
    pub user_id: String,
    /// Redirect URI from the authorization request.
    pub redirect_uri: String,
    /// Requested scope.
    pub scope: Scope,
    /// PKCE challenge, if the client sent one.
    pub pkce: Option<PkceChallenge>,
    /// OIDC nonce.
    pub nonce: Option<String>,
    /// When the identity authenticated.
    pub auth_time: Option<OffsetDateTime>,
}

/// A freshly issued code. The plaintext exists only here.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    /// The opaque code to hand to the client.
    pub code: String,
    /// Absolute expiry.
    pub expires_at: OffsetDateTime,
}

/// Input for [`AuthorizationCodeManager::redeem_code`].
#[derive(Debug, Clone, Copy)]
pub struct RedeemRequest<'a> {
    /// Code presented at the token endpoint.
    pub code: &'a str,
    /// Authenticated client presenting the code.
    pub client_id: &'a str,
    /// Redirect URI presented at the token endpoint.
    pub redirect_uri: &'a str,
    /// PKCE verifier, if presented.
    pub code_verifier: Option<&'a str>,
}

/// What a successful redemption yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemedGrant {
    /// Subject of the grant.
    pub user_id: String,
    /// Client the grant belongs to.
    pub client_id: String,
    /// Granted scope.
    pub scope: Scope,
    /// OIDC nonce bound at authorization.
    pub nonce: Option<String>,
    /// When the identity authenticated.
    pub auth_time: Option<OffsetDateTime>,
    /// Role from the permission record.
    pub role: Option<String>,
}

/// Issues and redeems authorization codes.
pub struct AuthorizationCodeManager {
    clients: Arc<ClientRegistry>,
    permissions: Arc<PermissionGate>,
    storage: Arc<dyn AuthorizationCodeStorage>,
    settings: CodeSettings,
}

impl AuthorizationCodeManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(
        clients: Arc<ClientRegistry>,
        permissions: Arc<PermissionGate>,
        storage: Arc<dyn AuthorizationCodeStorage>,
        settings: CodeSettings,
    ) -> Self {
        Self {
            clients,
            permissions,
            storage,
            settings,
        }
    }

    /// Whether the `plain` PKCE method is accepted.
    #[must_use]
    pub fn allows_plain_pkce(&self) -> bool {
        self.settings.allow_plain_pkce
    }

    /// Issues a new code.
    ///
    /// Not idempotent: every call yields an independent code.
    ///
    /// # Errors
    ///
    /// - `InvalidClient` / `ClientRevoked` for an unknown or disabled client
    /// - `InvalidRequest` for an unregistered redirect URI, a disallowed
    ///   grant type, or missing/disallowed PKCE
    /// - `InvalidScope` for an empty scope or one outside the client's
    ///   allow-list
    /// - `AccessDenied` when the permission gate refuses
    pub async fn issue_code(&self, request: CodeRequest) -> AuthResult<IssuedCode> {
        let client = self.clients.lookup_client(&request.client_id).await?;
        if !client.is_active() {
            return Err(AuthError::client_revoked(&client.client_id));
        }
        if !client.is_redirect_uri_allowed(&request.redirect_uri) {
            return Err(AuthError::invalid_request(
                "redirect_uri is not registered for this client",
            ));
        }
        if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(AuthError::invalid_request(
                "client may not use the authorization_code grant",
            ));
        }
        if request.scope.is_empty() {
            return Err(AuthError::invalid_scope("scope is required"));
        }
        if !client.is_scope_allowed(&request.scope) {
            return Err(AuthError::invalid_scope(format!(
                "scope '{}' exceeds the client's allowed scopes",
                request.scope
            )));
        }
        match &request.pkce {
            None if client.pkce_required => {
                return Err(AuthError::invalid_request(
                    "code_challenge is required for this client",
                ));
            }
            Some(challenge)
                if challenge.method() == PkceMethod::Plain && !self.settings.allow_plain_pkce =>
            {
                return Err(AuthError::invalid_request(
                    "code_challenge_method plain is not accepted",
                ));
            }
            _ => {}
        }

        self.permissions
            .require_eligible(&request.user_id, &request.client_id)
            .await?;

        let code = generate_opaque_token();
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.settings.lifetime;
        let record = AuthorizationCode {
            code_hash: hash_opaque_token(&code),
            client_id: request.client_id,
            user_id: request.user_id,
            redirect_uri: request.redirect_uri,
            scope: request.scope,
            pkce: request.pkce,
            nonce: request.nonce,
            auth_time: request.auth_time,
            created_at: now,
            expires_at,
            used: false,
            used_at: None,
        };

        with_deadline(
            self.settings.storage_timeout,
            "code.create",
            self.storage.create(&record),
        )
        .await?;

        tracing::info!(
            client_id = %record.client_id,
            user_id = %record.user_id,
            pkce = record.pkce.is_some(),
            "Authorization code issued"
        );

        Ok(IssuedCode { code, expires_at })
    }

    /// Redeems a code exactly once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` for any code-level failure and `AccessDenied`
    /// if the permission was revoked after issuance.
    pub async fn redeem_code(&self, request: RedeemRequest<'_>) -> AuthResult<RedeemedGrant> {
        let now = OffsetDateTime::now_utc();
        let code_hash = hash_opaque_token(request.code);

        let Some(record) = with_deadline(
            self.settings.storage_timeout,
            "code.consume",
            self.storage.consume(&code_hash, now),
        )
        .await?
        else {
            return Err(reject(request.client_id, "code unknown or already used"));
        };

        if let Some(cause) = redemption_failure(&record, &request, now) {
            return Err(reject(request.client_id, cause));
        }

        let eligibility = self
            .permissions
            .require_eligible(&record.user_id, &record.client_id)
            .await?;

        tracing::info!(
            client_id = %record.client_id,
            user_id = %record.user_id,
            "Authorization code redeemed"
        );

        Ok(RedeemedGrant {
            user_id: record.user_id,
            client_id: record.client_id,
            scope: record.scope,
            nonce: record.nonce,
            auth_time: record.auth_time,
            role: eligibility.role,
        })
    }

    /// Deletes expired codes.
    ///
    /// # Errors
    ///
    /// Returns a storage or timeout error.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        with_deadline(
            self.settings.storage_timeout,
            "code.purge",
            self.storage.purge_expired(now),
        )
        .await
    }
}

/// Returns the first failed check, if any. Every check runs.
fn redemption_failure(
    record: &AuthorizationCode,
    request: &RedeemRequest<'_>,
    now: OffsetDateTime,
) -> Option<&'static str> {
    let expired = record.is_expired_at(now);
    let client_mismatch = record.client_id != request.client_id;
    let redirect_mismatch = record.redirect_uri != request.redirect_uri;
    let pkce_failure = match (&record.pkce, request.code_verifier) {
        (Some(challenge), Some(verifier)) => challenge
            .verify(verifier)
            .err()
            .map(|_| "PKCE verifier mismatch"),
        (Some(_), None) => Some("PKCE verifier missing"),
        (None, Some(_)) => Some("PKCE verifier presented for a code without challenge"),
        (None, None) => None,
    };

    if expired {
        Some("code expired")
    } else if client_mismatch {
        Some("code issued to a different client")
    } else if redirect_mismatch {
        Some("redirect_uri mismatch")
    } else {
        pkce_failure
    }
}

fn reject(client_id: &str, cause: &'static str) -> AuthError {
    tracing::warn!(client_id, cause, "Authorization code redemption rejected");
    AuthError::invalid_grant(cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::pkce::PkceVerifier;
    use crate::test_support::{Harness, REDIRECT};

    fn request(client_id: &str, user_id: &str) -> CodeRequest {
        CodeRequest {
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            redirect_uri: REDIRECT.to_string(),
            scope: Scope::parse("openid profile"),
            pkce: None,
            nonce: None,
            auth_time: None,
        }
    }

    fn redeem<'a>(code: &'a str, client_id: &'a str) -> RedeemRequest<'a> {
        RedeemRequest {
            code,
            client_id,
            redirect_uri: REDIRECT,
            code_verifier: None,
        }
    }

    #[tokio::test]
    async fn test_issue_and_redeem_once() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;

        let issued = h.codes.issue_code(request(&client_id, "u1")).await.unwrap();
        let grant = h.codes.redeem_code(redeem(&issued.code, &client_id)).await.unwrap();
        assert_eq!(grant.user_id, "u1");
        assert_eq!(grant.scope.to_string(), "openid profile");
        assert_eq!(grant.role.as_deref(), Some("member"));

        let err = h
            .codes
            .redeem_code(redeem(&issued.code, &client_id))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_only_hash_is_stored() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;

        let issued = h.codes.issue_code(request(&client_id, "u1")).await.unwrap();
        let codes = h.code_storage.codes.read().unwrap();
        assert!(!codes.contains_key(&issued.code));
        assert!(codes.contains_key(&hash_opaque_token(&issued.code)));
    }

    #[tokio::test]
    async fn test_redirect_mismatch_is_invalid_grant_and_burns_code() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        let issued = h.codes.issue_code(request(&client_id, "u1")).await.unwrap();

        let mut bad = redeem(&issued.code, &client_id);
        bad.redirect_uri = "https://app.test/callback/";
        let err = h.codes.redeem_code(bad).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        let err = h
            .codes
            .redeem_code(redeem(&issued.code, &client_id))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_other_client_cannot_redeem() {
        let h = Harness::new();
        let (client_a, _) = h.confidential_client().await;
        let (client_b, _) = h.confidential_client().await;
        h.allow("u1", &client_a).await;
        let issued = h.codes.issue_code(request(&client_a, "u1")).await.unwrap();

        let err = h
            .codes
            .redeem_code(redeem(&issued.code, &client_b))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_expired_code_is_invalid_grant() {
        let h = Harness::with_code_lifetime(Duration::ZERO);
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;

        let issued = h.codes.issue_code(request(&client_id, "u1")).await.unwrap();
        let err = h
            .codes
            .redeem_code(redeem(&issued.code, &client_id))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_pkce_s256() {
        let h = Harness::new();
        let client_id = h.public_client().await;
        h.allow("u1", &client_id).await;

        let verifier = PkceVerifier::generate();
        let mut req = request(&client_id, "u1");
        req.pkce = Some(PkceChallenge::from_verifier(&verifier));
        let issued = h.codes.issue_code(req.clone()).await.unwrap();

        let wrong = PkceVerifier::generate();
        let mut bad = redeem(&issued.code, &client_id);
        bad.code_verifier = Some(wrong.as_str());
        let err = h.codes.redeem_code(bad).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        let issued = h.codes.issue_code(req).await.unwrap();
        let mut good = redeem(&issued.code, &client_id);
        good.code_verifier = Some(verifier.as_str());
        assert!(h.codes.redeem_code(good).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_verifier_for_pkce_code_is_invalid_grant() {
        let h = Harness::new();
        let client_id = h.public_client().await;
        h.allow("u1", &client_id).await;

        let mut req = request(&client_id, "u1");
        req.pkce = Some(PkceChallenge::from_verifier(&PkceVerifier::generate()));
        let issued = h.codes.issue_code(req).await.unwrap();

        let err = h
            .codes
            .redeem_code(redeem(&issued.code, &client_id))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_pkce_required_client_needs_challenge() {
        let h = Harness::new();
        let client_id = h.public_client().await;
        h.allow("u1", &client_id).await;

        let err = h.codes.issue_code(request(&client_id, "u1")).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_plain_pkce_rejected_by_default() {
        let h = Harness::new();
        let client_id = h.public_client().await;
        h.allow("u1", &client_id).await;

        let verifier = PkceVerifier::generate();
        let mut req = request(&client_id, "u1");
        req.pkce = Some(PkceChallenge::new(verifier.as_str(), PkceMethod::Plain).unwrap());
        let err = h.codes.issue_code(req).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_issue_requires_permission() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;

        let err = h.codes.issue_code(request(&client_id, "u1")).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "access_denied");
        assert!(h.code_storage.codes.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revocation_between_issue_and_redeem_is_access_denied() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        let issued = h.codes.issue_code(request(&client_id, "u1")).await.unwrap();

        h.permissions.revoke("u1", &client_id, "admin").await.unwrap();

        let err = h
            .codes
            .redeem_code(redeem(&issued.code, &client_id))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "access_denied");
    }

    #[tokio::test]
    async fn test_unregistered_redirect_rejected_at_issue() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;

        let mut req = request(&client_id, "u1");
        req.redirect_uri = "https://evil.test/callback".to_string();
        let err = h.codes.issue_code(req).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_empty_scope_rejected_at_issue() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;

        let mut req = request(&client_id, "u1");
        req.scope = Scope::parse("  ");
        let err = h.codes.issue_code(req).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_scope");
    }

    #[tokio::test]
    async fn test_revoked_client_cannot_get_codes() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        h.clients.revoke_client(&client_id).await.unwrap();

        let err = h.codes.issue_code(request(&client_id, "u1")).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "client_revoked");
    }

    #[tokio::test]
    async fn test_each_issue_is_independent() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;

        let a = h.codes.issue_code(request(&client_id, "u1")).await.unwrap();
        let b = h.codes.issue_code(request(&client_id, "u1")).await.unwrap();
        assert_ne!(a.code, b.code);
        assert!(h.codes.redeem_code(redeem(&a.code, &client_id)).await.is_ok());
        assert!(h.codes.redeem_code(redeem(&b.code, &client_id)).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_redemption_single_winner() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        let issued = h.codes.issue_code(request(&client_id, "u1")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let codes = h.codes.clone();
            let code = issued.code.clone();
            let client_id = client_id.clone();
            handles.push(tokio::spawn(async move {
                codes
                    .redeem_code(RedeemRequest {
                        code: &code,
                        client_id: &client_id,
                        redirect_uri: REDIRECT,
                        code_verifier: None,
                    })
                    .await
                    .is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let h = Harness::with_code_lifetime(Duration::ZERO);
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        h.codes.issue_code(request(&client_id, "u1")).await.unwrap();

        let removed = h
            .codes
            .purge_expired(OffsetDateTime::now_utc() + time::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
