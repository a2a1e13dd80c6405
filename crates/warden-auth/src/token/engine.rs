//! Token minting, verification, and refresh rotation.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Validation, decode, decode_header};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::deadline::with_deadline;
use crate::error::AuthError;
use crate::keys::KeyMaterialProvider;
use crate::oauth::code::RedeemedGrant;
use crate::oauth::permission::PermissionGate;
use crate::storage::{RefreshTokenStorage, UserStorage};
use crate::token::claims::{AccessClaims, Claims, IdClaims, RefreshClaims};
use crate::types::{Client, GrantType, RefreshTokenRecord, Scope};

/// Token engine settings.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// Value of the `iss` claim, checked on verification.
    pub issuer: String,
    /// Access token lifetime.
    pub access_token_lifetime: Duration,
    /// ID token lifetime.
    pub id_token_lifetime: Duration,
    /// Refresh token lifetime, restarted on every rotation.
    pub refresh_token_lifetime: Duration,
    /// Revoke the whole chain when a consumed refresh token is replayed.
    pub revoke_chain_on_replay: bool,
    /// Deadline for storage calls.
    pub storage_timeout: Duration,
}

/// A signed token with its identifier and absolute expiry.
#[derive(Debug, Clone)]
pub struct MintedToken {
    /// Compact JWS.
    pub token: String,
    /// The `jti` claim.
    pub jti: String,
    /// The `exp` claim.
    pub expires_at: OffsetDateTime,
}

/// Token endpoint success body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSet {
    /// Access token.
    pub access_token: String,

    /// Always `Bearer`.
    pub token_type: &'static str,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scope.
    pub scope: String,

    /// ID token, when `openid` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Refresh token, when the client may use the refresh grant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

struct RefreshSubject<'a> {
    user_id: &'a str,
    client_id: &'a str,
    scope: &'a Scope,
    auth_time: Option<OffsetDateTime>,
}

/// Mints and verifies signed tokens.
pub struct TokenEngine {
    keys: Arc<KeyMaterialProvider>,
    refresh: Arc<dyn RefreshTokenStorage>,
    users: Arc<dyn UserStorage>,
    permissions: Arc<PermissionGate>,
    settings: TokenSettings,
}

impl TokenEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        keys: Arc<KeyMaterialProvider>,
        refresh: Arc<dyn RefreshTokenStorage>,
        users: Arc<dyn UserStorage>,
        permissions: Arc<PermissionGate>,
        settings: TokenSettings,
    ) -> Self {
        Self {
            keys,
            refresh,
            users,
            permissions,
            settings,
        }
    }

    /// Issuer placed in every token.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.settings.issuer
    }

    // =========================================================================
    // Minting
    // =========================================================================

    /// Mints an access token.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if the claims cannot be signed.
    pub fn mint_access_token(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &Scope,
    ) -> AuthResult<MintedToken> {
        self.mint_access_token_at(user_id, client_id, scope, OffsetDateTime::now_utc())
    }

    fn mint_access_token_at(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &Scope,
        now: OffsetDateTime,
    ) -> AuthResult<MintedToken> {
        let jti = Uuid::new_v4().to_string();
        let expires_at = now + self.settings.access_token_lifetime;
        let claims = Claims::Access(AccessClaims {
            iss: self.settings.issuer.clone(),
            sub: user_id.to_string(),
            aud: client_id.to_string(),
            exp: expires_at.unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: jti.clone(),
            scope: scope.to_string(),
            client_id: client_id.to_string(),
        });

        Ok(MintedToken {
            token: self.sign(&claims)?,
            jti,
            expires_at,
        })
    }

    /// Mints an ID token with identity claims proportional to `scope`.
    ///
    /// A subject missing from the user directory still gets a token, with
    /// `sub` as its only identity claim.
    ///
    /// # Errors
    ///
    /// Returns a storage, timeout, or signing error.
    pub async fn mint_id_token(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &Scope,
        nonce: Option<&str>,
        auth_time: Option<OffsetDateTime>,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let mut claims = IdClaims {
            iss: self.settings.issuer.clone(),
            sub: user_id.to_string(),
            aud: client_id.to_string(),
            exp: (now + self.settings.id_token_lifetime).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            nonce: nonce.map(str::to_string),
            auth_time: auth_time.map(OffsetDateTime::unix_timestamp),
            name: None,
            preferred_username: None,
            email: None,
            email_verified: None,
        };

        if scope.contains("profile") || scope.contains("email") {
            let user = with_deadline(
                self.settings.storage_timeout,
                "user.find",
                self.users.find_by_id(user_id),
            )
            .await?;

            match user {
                Some(user) => {
                    if scope.contains("profile") {
                        claims.name = user.name;
                        claims.preferred_username = user.preferred_username;
                    }
                    if scope.contains("email") {
                        claims.email = Some(user.email);
                        claims.email_verified = Some(user.email_verified);
                    }
                }
                None => {
                    tracing::warn!(
                        user_id,
                        "Subject not found in user directory; ID token has sub only"
                    );
                }
            }
        }

        self.sign(&Claims::Id(claims))
    }

    /// Mints a refresh token starting a new rotation chain.
    ///
    /// # Errors
    ///
    /// Returns a storage, timeout, or signing error.
    pub async fn mint_refresh_token(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &Scope,
        auth_time: Option<OffsetDateTime>,
    ) -> AuthResult<MintedToken> {
        let chain_id = Uuid::new_v4().to_string();
        self.mint_refresh_in_chain(
            RefreshSubject {
                user_id,
                client_id,
                scope,
                auth_time,
            },
            &chain_id,
            None,
        )
        .await
    }

    async fn mint_refresh_in_chain(
        &self,
        subject: RefreshSubject<'_>,
        chain_id: &str,
        parent_jti: Option<&str>,
    ) -> AuthResult<MintedToken> {
        let RefreshSubject {
            user_id,
            client_id,
            scope,
            auth_time,
        } = subject;
        let now = OffsetDateTime::now_utc();
        let jti = Uuid::new_v4().to_string();
        let expires_at = now + self.settings.refresh_token_lifetime;
        let claims = Claims::Refresh(RefreshClaims {
            iss: self.settings.issuer.clone(),
            sub: user_id.to_string(),
            aud: client_id.to_string(),
            exp: expires_at.unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: jti.clone(),
            scope: scope.to_string(),
            chain_id: chain_id.to_string(),
        });
        let token = self.sign(&claims)?;

        let record = RefreshTokenRecord {
            jti: jti.clone(),
            chain_id: chain_id.to_string(),
            parent_jti: parent_jti.map(str::to_string),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.clone(),
            auth_time,
            issued_at: now,
            expires_at,
            consumed_at: None,
            revoked_at: None,
        };
        with_deadline(
            self.settings.storage_timeout,
            "refresh.create",
            self.refresh.create(&record),
        )
        .await?;

        Ok(MintedToken {
            token,
            jti,
            expires_at,
        })
    }

    fn sign(&self, claims: &Claims) -> AuthResult<String> {
        self.keys.sign(claims).map_err(|e| {
            tracing::error!(error = %e, "Token signing failed");
            AuthError::signing(e.to_string())
        })
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Verifies signature, issuer, and expiry at the current time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` or `TokenExpired`.
    pub fn verify_token(&self, token: &str) -> AuthResult<Claims> {
        self.verify_token_at(token, OffsetDateTime::now_utc())
    }

    /// Verifies a token as of `now`.
    ///
    /// A token whose `exp` equals `now` is expired.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for a bad header, unknown or retired key, bad
    /// signature, wrong issuer, or malformed claims; `TokenExpired` past
    /// expiry.
    pub fn verify_token_at(&self, token: &str, now: OffsetDateTime) -> AuthResult<Claims> {
        let header = decode_header(token)
            .map_err(|e| AuthError::invalid_token(format!("malformed header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_token("missing kid"))?;
        let key = self
            .keys
            .verification_key(&kid, now)
            .ok_or_else(|| AuthError::invalid_token(format!("unknown or retired kid '{kid}'")))?;
        if header.alg != key.algorithm().to_jwt_algorithm() {
            return Err(AuthError::invalid_token("algorithm does not match key"));
        }

        let mut validation = Validation::new(key.algorithm().to_jwt_algorithm());
        validation.set_issuer(&[&self.settings.issuer]);
        // Expiry is checked below without leeway.
        validation.validate_exp = false;
        validation.validate_aud = false;

        let claims = decode::<Claims>(token, key.decoding_key(), &validation)
            .map_err(|e| AuthError::invalid_token(e.to_string()))?
            .claims;

        if claims.expires_at() <= now.unix_timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }

    // =========================================================================
    // Grants
    // =========================================================================

    /// Mints the token set for a redeemed authorization code.
    ///
    /// # Errors
    ///
    /// Returns a storage, timeout, or signing error.
    pub async fn issue_for_grant(
        &self,
        grant: &RedeemedGrant,
        client: &Client,
    ) -> AuthResult<TokenSet> {
        let access = self.mint_access_token(&grant.user_id, &grant.client_id, &grant.scope)?;

        let id_token = if grant.scope.contains("openid") {
            Some(
                self.mint_id_token(
                    &grant.user_id,
                    &grant.client_id,
                    &grant.scope,
                    grant.nonce.as_deref(),
                    grant.auth_time,
                )
                .await?,
            )
        } else {
            None
        };

        let refresh_token = if client.is_grant_type_allowed(GrantType::RefreshToken) {
            Some(
                self.mint_refresh_token(
                    &grant.user_id,
                    &grant.client_id,
                    &grant.scope,
                    grant.auth_time,
                )
                .await?
                    .token,
            )
        } else {
            None
        };

        tracing::info!(
            client_id = %grant.client_id,
            user_id = %grant.user_id,
            jti = %access.jti,
            "Tokens issued for authorization code"
        );

        Ok(TokenSet {
            access_token: access.token,
            token_type: "Bearer",
            expires_in: self.settings.access_token_lifetime.as_secs(),
            scope: grant.scope.to_string(),
            id_token,
            refresh_token,
        })
    }

    /// Exchanges a refresh token for a new token set.
    ///
    /// The presented token's chain entry is consumed atomically before
    /// anything is minted. Presenting an already consumed token is treated
    /// as theft: the chain is revoked when configured.
    ///
    /// # Errors
    ///
    /// - `InvalidGrant` for an invalid, expired, foreign, consumed, or
    ///   revoked refresh token
    /// - `InvalidScope` when `requested_scope` widens the original grant
    /// - `AccessDenied` when the permission was revoked; the chain is
    ///   revoked too
    pub async fn rotate_refresh_token(
        &self,
        presented: &str,
        client: &Client,
        requested_scope: Option<&Scope>,
    ) -> AuthResult<TokenSet> {
        let claims = match self.verify_token(presented) {
            Ok(Claims::Refresh(claims)) => claims,
            Ok(other) => {
                let cause = format!("{} token presented for refresh", other.kind());
                return Err(reject(&client.client_id, &cause));
            }
            Err(e) => return Err(reject(&client.client_id, &e.to_string())),
        };
        if claims.aud != client.client_id {
            return Err(reject(
                &client.client_id,
                "refresh token issued to a different client",
            ));
        }

        let original = Scope::parse(&claims.scope);
        let scope = match requested_scope {
            Some(requested) if !requested.is_empty() => {
                if !requested.is_subset_of(&original) {
                    return Err(AuthError::invalid_scope(format!(
                        "scope '{requested}' exceeds the original grant"
                    )));
                }
                requested.clone()
            }
            _ => original,
        };

        let now = OffsetDateTime::now_utc();
        let consumed = with_deadline(
            self.settings.storage_timeout,
            "refresh.consume",
            self.refresh.consume(&claims.jti, now),
        )
        .await?;

        let Some(record) = consumed else {
            return Err(self.on_unredeemable(&claims, now).await);
        };

        let eligibility = self
            .permissions
            .check_grant_eligible(&record.user_id, &record.client_id)
            .await?;
        if !eligibility.eligible {
            self.revoke_chain(&record.chain_id, now).await?;
            return Err(AuthError::access_denied(format!(
                "'{}' lost permission for '{}'",
                record.user_id, record.client_id
            )));
        }

        let access = self.mint_access_token(&record.user_id, &record.client_id, &scope)?;
        let id_token = if scope.contains("openid") {
            Some(
                self.mint_id_token(
                    &record.user_id,
                    &record.client_id,
                    &scope,
                    None,
                    record.auth_time,
                )
                .await?,
            )
        } else {
            None
        };
        // Fails when a replay revoked the chain after our consume.
        let refresh = self
            .mint_refresh_in_chain(
                RefreshSubject {
                    user_id: &record.user_id,
                    client_id: &record.client_id,
                    scope: &scope,
                    auth_time: record.auth_time,
                },
                &record.chain_id,
                Some(&record.jti),
            )
            .await
            .map_err(|e| match e {
                AuthError::InvalidGrant { .. } => {
                    reject(&record.client_id, "chain revoked during rotation")
                }
                other => other,
            })?;

        tracing::info!(
            client_id = %record.client_id,
            user_id = %record.user_id,
            chain_id = %record.chain_id,
            "Refresh token rotated"
        );

        Ok(TokenSet {
            access_token: access.token,
            token_type: "Bearer",
            expires_in: self.settings.access_token_lifetime.as_secs(),
            scope: scope.to_string(),
            id_token,
            refresh_token: Some(refresh.token),
        })
    }

    async fn on_unredeemable(&self, claims: &RefreshClaims, now: OffsetDateTime) -> AuthError {
        let record = match with_deadline(
            self.settings.storage_timeout,
            "refresh.find",
            self.refresh.find(&claims.jti),
        )
        .await
        {
            Ok(record) => record,
            Err(e) => return e,
        };

        match record {
            Some(record) if record.consumed_at.is_some() => {
                tracing::warn!(
                    client_id = %record.client_id,
                    user_id = %record.user_id,
                    chain_id = %record.chain_id,
                    "Consumed refresh token replayed"
                );
                if self.settings.revoke_chain_on_replay
                    && let Err(e) = self.revoke_chain(&record.chain_id, now).await
                {
                    return e;
                }
                reject(&claims.aud, "refresh token replayed")
            }
            Some(_) => reject(&claims.aud, "refresh token revoked"),
            None => reject(&claims.aud, "refresh token unknown"),
        }
    }

    async fn revoke_chain(&self, chain_id: &str, now: OffsetDateTime) -> AuthResult<u64> {
        let revoked = with_deadline(
            self.settings.storage_timeout,
            "refresh.revoke_chain",
            self.refresh.revoke_chain(chain_id, now),
        )
        .await?;
        tracing::info!(chain_id, revoked, "Refresh token chain revoked");
        Ok(revoked)
    }

    /// Revokes every token in a rotation chain.
    ///
    /// # Errors
    ///
    /// Returns a storage or timeout error.
    pub async fn revoke_refresh_chain(&self, chain_id: &str) -> AuthResult<u64> {
        self.revoke_chain(chain_id, OffsetDateTime::now_utc()).await
    }

    /// Deletes expired refresh token records.
    ///
    /// # Errors
    ///
    /// Returns a storage or timeout error.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        with_deadline(
            self.settings.storage_timeout,
            "refresh.purge",
            self.refresh.purge_expired(now),
        )
        .await
    }
}

fn reject(client_id: &str, cause: &str) -> AuthError {
    tracing::warn!(client_id, cause, "Refresh token rejected");
    AuthError::invalid_grant(cause)
}
