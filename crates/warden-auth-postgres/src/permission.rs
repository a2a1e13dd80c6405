//! Per-(user, client) permission storage.
//!
//! Every mutation is one `INSERT ... ON CONFLICT DO UPDATE`, so concurrent
//! grants and revokes on a pair serialize on the primary key.

use async_trait::async_trait;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use warden_auth::AuthResult;
use warden_auth::storage::PermissionStorage;
use warden_auth::types::{Permission, PermissionStatus};

use crate::{PostgresAuthStorage, StorageError, StorageResult};

type PermissionTuple = (
    String,
    String,
    bool,
    String,
    String,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
    Option<String>,
    Option<OffsetDateTime>,
    Option<String>,
    OffsetDateTime,
);

fn permission_from_tuple(row: PermissionTuple) -> StorageResult<Permission> {
    let (
        user_id,
        client_id,
        access,
        role,
        status,
        requested_at,
        granted_at,
        granted_by,
        revoked_at,
        revoked_by,
        updated_at,
    ) = row;
    let status = PermissionStatus::parse(&status)
        .ok_or_else(|| StorageError::invalid_row(format!("unknown permission status '{status}'")))?;

    Ok(Permission {
        user_id,
        client_id,
        access,
        role,
        status,
        requested_at,
        granted_at,
        granted_by,
        revoked_at,
        revoked_by,
        updated_at,
    })
}

#[async_trait]
impl PermissionStorage for PostgresAuthStorage {
    async fn find(&self, user_id: &str, client_id: &str) -> AuthResult<Option<Permission>> {
        let row: Option<PermissionTuple> = query_as(
            r#"
            SELECT user_id, client_id, access, role, status, requested_at, granted_at,
                   granted_by, revoked_at, revoked_by, updated_at
            FROM permissions
            WHERE user_id = $1 AND client_id = $2
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .fetch_optional(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(permission_from_tuple).transpose()?)
    }

    async fn upsert_request(
        &self,
        user_id: &str,
        client_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission> {
        // an existing record keeps its state; only a new one is marked requested
        let row: PermissionTuple = query_as(
            r#"
            INSERT INTO permissions (user_id, client_id, status, requested_at, updated_at)
            VALUES ($1, $2, 'pending', $3, $3)
            ON CONFLICT (user_id, client_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING user_id, client_id, access, role, status, requested_at, granted_at,
                      granted_by, revoked_at, revoked_by, updated_at
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            StorageError::from_insert(e, || "permission record collision".to_string())
        })?;

        Ok(permission_from_tuple(row)?)
    }

    async fn upsert_grant(
        &self,
        user_id: &str,
        client_id: &str,
        role: &str,
        actor: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission> {
        let row: PermissionTuple = query_as(
            r#"
            INSERT INTO permissions (user_id, client_id, access, role, status,
                                     granted_at, granted_by, updated_at)
            VALUES ($1, $2, true, $3, 'active', $5, $4, $5)
            ON CONFLICT (user_id, client_id) DO UPDATE SET
                access = true,
                role = EXCLUDED.role,
                status = 'active',
                granted_at = EXCLUDED.granted_at,
                granted_by = EXCLUDED.granted_by,
                revoked_at = NULL,
                revoked_by = NULL,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, client_id, access, role, status, requested_at, granted_at,
                      granted_by, revoked_at, revoked_by, updated_at
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .bind(role)
        .bind(actor)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            StorageError::from_insert(e, || "permission record collision".to_string())
        })?;

        Ok(permission_from_tuple(row)?)
    }

    async fn upsert_revoke(
        &self,
        user_id: &str,
        client_id: &str,
        actor: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission> {
        let row: PermissionTuple = query_as(
            r#"
            INSERT INTO permissions (user_id, client_id, access, status,
                                     revoked_at, revoked_by, updated_at)
            VALUES ($1, $2, false, 'revoked', $4, $3, $4)
            ON CONFLICT (user_id, client_id) DO UPDATE SET
                access = false,
                status = 'revoked',
                revoked_at = EXCLUDED.revoked_at,
                revoked_by = EXCLUDED.revoked_by,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, client_id, access, role, status, requested_at, granted_at,
                      granted_by, revoked_at, revoked_by, updated_at
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .bind(actor)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            StorageError::from_insert(e, || "permission record collision".to_string())
        })?;

        Ok(permission_from_tuple(row)?)
    }

    async fn list_by_client(&self, client_id: &str) -> AuthResult<Vec<Permission>> {
        let rows: Vec<PermissionTuple> = query_as(
            r#"
            SELECT user_id, client_id, access, role, status, requested_at, granted_at,
                   granted_by, revoked_at, revoked_by, updated_at
            FROM permissions
            WHERE client_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(client_id)
        .fetch_all(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(permission_from_tuple)
            .collect::<StorageResult<Vec<_>>>()?)
    }
}
