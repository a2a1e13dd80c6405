//! Embedded schema migrations.
//!
//! Migrations are compiled into the binary with `include_str!` and tracked
//! in `_sqlx_migrations`. To add one, create the SQL file under
//! `migrations/` and append it to `embedded_migrations!` below.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use tracing::{info, instrument};

use crate::{PgPool, StorageError, StorageResult};

macro_rules! embedded_migrations {
    () => {
        &[(
            20260101000001i64,
            "auth_schema",
            include_str!("../migrations/20260101000001_auth_schema.sql"),
        )]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Runs all pending migrations.
///
/// # Errors
///
/// Returns `Migration` if a migration fails to execute.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> StorageResult<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running embedded migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };
    migrator
        .run(pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    info!("Database migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let migrations = build_migrations();
        assert!(!migrations.is_empty());
        assert!(
            migrations
                .windows(2)
                .all(|pair| pair[0].version < pair[1].version)
        );
    }

    #[test]
    fn test_schema_declares_cas_columns() {
        let sql = &build_migrations()[0].sql;
        assert!(sql.contains("used                   BOOLEAN NOT NULL DEFAULT false"));
        assert!(sql.contains("PRIMARY KEY (kind, token_hash)"));
        assert!(sql.contains("ON users (lower(email))"));
    }

    #[test]
    fn test_schema_constrains_permissions_and_chains() {
        let sql = &build_migrations()[0].sql;
        assert!(sql.contains("CHECK (NOT access OR status IN ('approved', 'active'))"));
        assert!(sql.contains("user_id       TEXT NOT NULL REFERENCES users (id)"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS refresh_token_chains"));
        assert!(sql.contains("REFERENCES refresh_token_chains (chain_id)"));
    }
}
