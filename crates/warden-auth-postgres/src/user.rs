//! Identity directory storage.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use warden_auth::AuthResult;
use warden_auth::storage::UserStorage;
use warden_auth::types::User;

use crate::{PostgresAuthStorage, StorageError};

type UserTuple = (String, String, bool, Option<String>, Option<String>);

fn user_from_tuple(row: UserTuple) -> User {
    let (id, email, email_verified, name, preferred_username) = row;
    User {
        id,
        email,
        email_verified,
        name,
        preferred_username,
    }
}

#[async_trait]
impl UserStorage for PostgresAuthStorage {
    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>> {
        let row: Option<UserTuple> = query_as(
            "SELECT id, email, email_verified, name, preferred_username FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(user_from_tuple))
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let row: Option<UserTuple> = query_as(
            r#"
            SELECT id, email, email_verified, name, preferred_username
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email.trim())
        .fetch_optional(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(user_from_tuple))
    }

    async fn create(&self, user: &User) -> AuthResult<()> {
        query(
            r#"
            INSERT INTO users (id, email, email_verified, name, preferred_username)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&user.id)
        .bind(user.email.trim())
        .bind(user.email_verified)
        .bind(&user.name)
        .bind(&user.preferred_username)
        .execute(self.pool())
        .await
        .map_err(|e| {
            StorageError::from_insert(e, || {
                format!("user '{}' or email '{}' already exists", user.id, user.email)
            })
        })?;

        Ok(())
    }
}
