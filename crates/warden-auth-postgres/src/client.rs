//! OAuth client storage.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use warden_auth::AuthResult;
use warden_auth::storage::ClientStorage;
use warden_auth::types::{Client, ClientStatus, GrantType};

use crate::{PostgresAuthStorage, StorageError, StorageResult};

type ClientTuple = (
    String,
    Option<String>,
    String,
    Vec<String>,
    Vec<String>,
    Vec<String>,
    bool,
    String,
    OffsetDateTime,
    OffsetDateTime,
);

fn client_from_tuple(row: ClientTuple) -> StorageResult<Client> {
    let (
        client_id,
        secret_hash,
        name,
        redirect_uris,
        allowed_scopes,
        grant_types,
        pkce_required,
        status,
        created_at,
        updated_at,
    ) = row;

    let grant_types = grant_types
        .iter()
        .map(|g| {
            GrantType::parse(g)
                .ok_or_else(|| StorageError::invalid_row(format!("unknown grant type '{g}'")))
        })
        .collect::<StorageResult<Vec<_>>>()?;
    let status = ClientStatus::parse(&status)
        .ok_or_else(|| StorageError::invalid_row(format!("unknown client status '{status}'")))?;

    Ok(Client {
        client_id,
        secret_hash,
        name,
        redirect_uris,
        allowed_scopes,
        grant_types,
        pkce_required,
        status,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl ClientStorage for PostgresAuthStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        let row: Option<ClientTuple> = query_as(
            r#"
            SELECT client_id, secret_hash, name, redirect_uris, allowed_scopes,
                   grant_types, pkce_required, status, created_at, updated_at
            FROM clients
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(client_from_tuple).transpose()?)
    }

    async fn create(&self, client: &Client) -> AuthResult<()> {
        let grant_types: Vec<String> = client
            .grant_types
            .iter()
            .map(|g| g.as_str().to_string())
            .collect();

        query(
            r#"
            INSERT INTO clients (client_id, secret_hash, name, redirect_uris, allowed_scopes,
                                 grant_types, pkce_required, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.secret_hash)
        .bind(&client.name)
        .bind(&client.redirect_uris)
        .bind(&client.allowed_scopes)
        .bind(&grant_types)
        .bind(client.pkce_required)
        .bind(client.status.as_str())
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            StorageError::from_insert(e, || {
                format!("client '{}' already exists", client.client_id)
            })
        })?;

        Ok(())
    }

    async fn set_status(&self, client_id: &str, status: ClientStatus) -> AuthResult<bool> {
        let result = query(
            "UPDATE clients SET status = $2, updated_at = NOW() WHERE client_id = $1",
        )
        .bind(client_id)
        .bind(status.as_str())
        .execute(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_secret_hash(&self, client_id: &str, secret_hash: &str) -> AuthResult<bool> {
        let result =
            query("UPDATE clients SET secret_hash = $2, updated_at = NOW() WHERE client_id = $1")
                .bind(client_id)
                .bind(secret_hash)
                .execute(self.pool())
                .await
                .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, limit: i64, offset: i64) -> AuthResult<Vec<Client>> {
        let rows: Vec<ClientTuple> = query_as(
            r#"
            SELECT client_id, secret_hash, name, redirect_uris, allowed_scopes,
                   grant_types, pkce_required, status, created_at, updated_at
            FROM clients
            ORDER BY created_at, client_id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(client_from_tuple)
            .collect::<StorageResult<Vec<_>>>()?)
    }
}
