//! Permission gate.
//!
//! Decides whether an authenticated identity may complete a grant for a
//! client. Every check reads storage directly; there is no cache, so a
//! revocation is observed by the very next check.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::deadline::with_deadline;
use crate::error::AuthError;
use crate::storage::PermissionStorage;
use crate::types::{Eligibility, Permission};

/// Per-(identity, client) authorization.
pub struct PermissionGate {
    storage: Arc<dyn PermissionStorage>,
    timeout: Duration,
}

impl PermissionGate {
    /// Creates a gate over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn PermissionStorage>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Eligible iff a record exists with the access flag set and status
    /// approved or active.
    ///
    /// # Errors
    ///
    /// Returns a storage or timeout error.
    pub async fn check_grant_eligible(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> AuthResult<Eligibility> {
        let record = with_deadline(
            self.timeout,
            "permission.find",
            self.storage.find(user_id, client_id),
        )
        .await?;

        Ok(match record {
            Some(permission) if permission.is_effective() => Eligibility {
                eligible: true,
                role: Some(permission.role),
            },
            _ => Eligibility::denied(),
        })
    }

    /// Like [`check_grant_eligible`](Self::check_grant_eligible) but turns
    /// ineligibility into `access_denied`.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` when not eligible.
    pub async fn require_eligible(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> AuthResult<Eligibility> {
        let eligibility = self.check_grant_eligible(user_id, client_id).await?;
        if !eligibility.eligible {
            tracing::info!(user_id, client_id, "No effective permission for client");
            return Err(AuthError::access_denied(format!(
                "'{user_id}' has no approved permission for '{client_id}'"
            )));
        }
        Ok(eligibility)
    }

    /// Records an access request. Existing records are left untouched.
    ///
    /// # Errors
    ///
    /// Returns a storage or timeout error.
    pub async fn request_access(&self, user_id: &str, client_id: &str) -> AuthResult<Permission> {
        with_deadline(
            self.timeout,
            "permission.request",
            self.storage
                .upsert_request(user_id, client_id, OffsetDateTime::now_utc()),
        )
        .await
    }

    /// Grants access with `role`, recording `actor`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty role or actor.
    pub async fn grant(
        &self,
        user_id: &str,
        client_id: &str,
        role: &str,
        actor: &str,
    ) -> AuthResult<Permission> {
        if role.trim().is_empty() {
            return Err(AuthError::invalid_request("role cannot be empty"));
        }
        if actor.trim().is_empty() {
            return Err(AuthError::invalid_request("actor cannot be empty"));
        }

        let permission = with_deadline(
            self.timeout,
            "permission.grant",
            self.storage
                .upsert_grant(user_id, client_id, role, actor, OffsetDateTime::now_utc()),
        )
        .await?;
        tracing::info!(user_id, client_id, role, actor, "Permission granted");
        Ok(permission)
    }

    /// Revokes access, recording `actor`. Idempotent; revoking a pair with
    /// no record creates a revoked one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty actor.
    pub async fn revoke(
        &self,
        user_id: &str,
        client_id: &str,
        actor: &str,
    ) -> AuthResult<Permission> {
        if actor.trim().is_empty() {
            return Err(AuthError::invalid_request("actor cannot be empty"));
        }

        let permission = with_deadline(
            self.timeout,
            "permission.revoke",
            self.storage
                .upsert_revoke(user_id, client_id, actor, OffsetDateTime::now_utc()),
        )
        .await?;
        tracing::info!(user_id, client_id, actor, "Permission revoked");
        Ok(permission)
    }

    /// Lists every permission record for a client.
    ///
    /// # Errors
    ///
    /// Returns a storage or timeout error.
    pub async fn list_for_client(&self, client_id: &str) -> AuthResult<Vec<Permission>> {
        with_deadline(
            self.timeout,
            "permission.list",
            self.storage.list_by_client(client_id),
        )
        .await
    }
}
