use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use warden_auth::AuthResult;
use warden_auth::error::AuthError;
use warden_auth::storage::{
    AuthorizationCodeStorage, ClientStorage, PermissionStorage, RefreshTokenStorage,
    SessionStorage, UserStorage,
};
use warden_auth::types::{
    AuthorizationCode, Client, ClientStatus, Permission, PermissionStatus, RefreshTokenRecord,
    Session, SessionKind, User,
};

/// In-memory backend for every storage trait.
///
/// Compare-and-set operations run under the shard write lock of the
/// affected key, so concurrent `consume` calls on one key have exactly one
/// winner.
#[derive(Debug, Default)]
pub struct InMemoryAuthStorage {
    clients: DashMap<String, Client>,
    codes: DashMap<String, AuthorizationCode>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
    // chain id -> chain state; outlives revoked records until the chain expires
    refresh_chains: DashMap<String, ChainState>,
    sessions: DashMap<(SessionKind, String), Session>,
    permissions: DashMap<(String, String), Permission>,
    users: DashMap<String, User>,
    // normalized email -> user id
    user_emails: DashMap<String, String>,
}

impl InMemoryAuthStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored authorization codes, used or not.
    #[must_use]
    pub fn code_count(&self) -> usize {
        self.codes.len()
    }

    /// Number of stored refresh token records.
    #[must_use]
    pub fn refresh_token_count(&self) -> usize {
        self.refresh_tokens.len()
    }

    /// Number of stored sessions of both kinds.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct ChainState {
    revoked_at: Option<OffsetDateTime>,
    expires_at: OffsetDateTime,
}

fn purge<K, V>(map: &DashMap<K, V>, expired: impl Fn(&V) -> bool) -> u64
where
    K: Eq + std::hash::Hash,
{
    let before = map.len();
    map.retain(|_, value| !expired(value));
    before.saturating_sub(map.len()) as u64
}

fn blank_permission(user_id: &str, client_id: &str, now: OffsetDateTime) -> Permission {
    Permission {
        user_id: user_id.to_string(),
        client_id: client_id.to_string(),
        access: false,
        role: "member".to_string(),
        status: PermissionStatus::Pending,
        requested_at: None,
        granted_at: None,
        granted_by: None,
        revoked_at: None,
        revoked_by: None,
        updated_at: now,
    }
}

// =============================================================================
// Clients
// =============================================================================

#[async_trait]
impl ClientStorage for InMemoryAuthStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn create(&self, client: &Client) -> AuthResult<()> {
        match self.clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Err(AuthError::conflict(format!(
                "client '{}' already exists",
                client.client_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(())
            }
        }
    }

    async fn set_status(&self, client_id: &str, status: ClientStatus) -> AuthResult<bool> {
        Ok(match self.clients.get_mut(client_id) {
            Some(mut client) => {
                client.status = status;
                client.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        })
    }

    async fn set_secret_hash(&self, client_id: &str, secret_hash: &str) -> AuthResult<bool> {
        Ok(match self.clients.get_mut(client_id) {
            Some(mut client) => {
                client.secret_hash = Some(secret_hash.to_string());
                client.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        })
    }

    async fn list(&self, limit: i64, offset: i64) -> AuthResult<Vec<Client>> {
        let mut clients: Vec<Client> = self.clients.iter().map(|c| c.value().clone()).collect();
        clients.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });
        Ok(clients
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

// =============================================================================
// Authorization codes
// =============================================================================

#[async_trait]
impl AuthorizationCodeStorage for InMemoryAuthStorage {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        match self.codes.entry(code.code_hash.clone()) {
            Entry::Occupied(_) => Err(AuthError::conflict("authorization code collision")),
            Entry::Vacant(slot) => {
                slot.insert(code.clone());
                Ok(())
            }
        }
    }

    async fn consume(
        &self,
        code_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<AuthorizationCode>> {
        let Some(mut code) = self.codes.get_mut(code_hash) else {
            return Ok(None);
        };
        if code.used {
            return Ok(None);
        }
        code.used = true;
        code.used_at = Some(now);
        Ok(Some(code.clone()))
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        Ok(purge(&self.codes, |code| code.expires_at <= now))
    }
}

// =============================================================================
// Refresh tokens
// =============================================================================

#[async_trait]
impl RefreshTokenStorage for InMemoryAuthStorage {
    async fn create(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        // The chain entry stays locked until the record is in place, so a
        // concurrent revoke_chain either sees the record or blocks us.
        let mut chain = self
            .refresh_chains
            .entry(record.chain_id.clone())
            .or_insert(ChainState {
                revoked_at: None,
                expires_at: record.expires_at,
            });
        if chain.revoked_at.is_some() {
            return Err(AuthError::invalid_grant(format!(
                "refresh token chain '{}' is revoked",
                record.chain_id
            )));
        }
        chain.expires_at = chain.expires_at.max(record.expires_at);

        match self.refresh_tokens.entry(record.jti.clone()) {
            Entry::Occupied(_) => Err(AuthError::conflict(format!(
                "refresh token '{}' already exists",
                record.jti
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, jti: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self.refresh_tokens.get(jti).map(|r| r.clone()))
    }

    async fn consume(
        &self,
        jti: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<RefreshTokenRecord>> {
        let Some(mut record) = self.refresh_tokens.get_mut(jti) else {
            return Ok(None);
        };
        if record.consumed_at.is_some() || record.revoked_at.is_some() {
            return Ok(None);
        }
        record.consumed_at = Some(now);
        Ok(Some(record.clone()))
    }

    async fn revoke_chain(&self, chain_id: &str, now: OffsetDateTime) -> AuthResult<u64> {
        let mut chain = self
            .refresh_chains
            .entry(chain_id.to_string())
            .or_insert(ChainState {
                revoked_at: None,
                expires_at: now,
            });
        chain.revoked_at.get_or_insert(now);

        let mut revoked = 0;
        for mut record in self.refresh_tokens.iter_mut() {
            if record.chain_id == chain_id && record.revoked_at.is_none() {
                record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let purged = purge(&self.refresh_tokens, |record| record.expires_at <= now);
        self.refresh_chains.retain(|_, chain| chain.expires_at > now);
        Ok(purged)
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[async_trait]
impl SessionStorage for InMemoryAuthStorage {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        match self
            .sessions
            .entry((session.kind, session.token_hash.clone()))
        {
            Entry::Occupied(_) => Err(AuthError::conflict("session token collision")),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, kind: SessionKind, token_hash: &str) -> AuthResult<Option<Session>> {
        Ok(self
            .sessions
            .get(&(kind, token_hash.to_string()))
            .map(|s| s.clone()))
    }

    async fn touch(
        &self,
        kind: SessionKind,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<()> {
        if let Some(mut session) = self.sessions.get_mut(&(kind, token_hash.to_string())) {
            session.last_accessed_at = now;
        }
        Ok(())
    }

    async fn delete(&self, kind: SessionKind, token_hash: &str) -> AuthResult<bool> {
        Ok(self
            .sessions
            .remove(&(kind, token_hash.to_string()))
            .is_some())
    }

    async fn delete_by_user(&self, kind: SessionKind, user_id: &str) -> AuthResult<u64> {
        Ok(purge(&self.sessions, |s| s.kind == kind && s.user_id == user_id))
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        Ok(purge(&self.sessions, |s| s.expires_at <= now))
    }
}

// =============================================================================
// Permissions
// =============================================================================

#[async_trait]
impl PermissionStorage for InMemoryAuthStorage {
    async fn find(&self, user_id: &str, client_id: &str) -> AuthResult<Option<Permission>> {
        Ok(self
            .permissions
            .get(&(user_id.to_string(), client_id.to_string()))
            .map(|p| p.clone()))
    }

    async fn upsert_request(
        &self,
        user_id: &str,
        client_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission> {
        let record = self
            .permissions
            .entry((user_id.to_string(), client_id.to_string()))
            .or_insert_with(|| {
                let mut permission = blank_permission(user_id, client_id, now);
                permission.requested_at = Some(now);
                permission
            });
        Ok(record.clone())
    }

    async fn upsert_grant(
        &self,
        user_id: &str,
        client_id: &str,
        role: &str,
        actor: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission> {
        let mut record = self
            .permissions
            .entry((user_id.to_string(), client_id.to_string()))
            .or_insert_with(|| blank_permission(user_id, client_id, now));
        record.access = true;
        record.role = role.to_string();
        record.status = PermissionStatus::Active;
        record.granted_at = Some(now);
        record.granted_by = Some(actor.to_string());
        record.revoked_at = None;
        record.revoked_by = None;
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn upsert_revoke(
        &self,
        user_id: &str,
        client_id: &str,
        actor: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission> {
        let mut record = self
            .permissions
            .entry((user_id.to_string(), client_id.to_string()))
            .or_insert_with(|| blank_permission(user_id, client_id, now));
        record.access = false;
        record.status = PermissionStatus::Revoked;
        record.revoked_at = Some(now);
        record.revoked_by = Some(actor.to_string());
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn list_by_client(&self, client_id: &str) -> AuthResult<Vec<Permission>> {
        let mut records: Vec<Permission> = self
            .permissions
            .iter()
            .filter(|p| p.client_id == client_id)
            .map(|p| p.value().clone())
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(records)
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserStorage for InMemoryAuthStorage {
    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let normalized = email.trim().to_lowercase();
        let Some(user_id) = self.user_emails.get(&normalized).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn create(&self, user: &User) -> AuthResult<()> {
        // Lock order: email index, then users.
        let email_slot = match self.user_emails.entry(user.normalized_email()) {
            Entry::Occupied(_) => {
                return Err(AuthError::conflict(format!(
                    "email '{}' is already registered",
                    user.email
                )));
            }
            Entry::Vacant(slot) => slot,
        };
        match self.users.entry(user.id.clone()) {
            Entry::Occupied(_) => Err(AuthError::conflict(format!(
                "user '{}' already exists",
                user.id
            ))),
            Entry::Vacant(user_slot) => {
                user_slot.insert(user.clone());
                email_slot.insert(user.id.clone());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_auth::types::Scope;

    fn code(hash: &str, expires_at: OffsetDateTime) -> AuthorizationCode {
        AuthorizationCode {
            code_hash: hash.to_string(),
            client_id: "c1".to_string(),
            user_id: "u1".to_string(),
            redirect_uri: "https://app.test/cb".to_string(),
            scope: Scope::parse("openid"),
            pkce: None,
            nonce: None,
            auth_time: None,
            created_at: OffsetDateTime::now_utc(),
            expires_at,
            used: false,
            used_at: None,
        }
    }

    fn refresh(jti: &str, chain_id: &str, expires_at: OffsetDateTime) -> RefreshTokenRecord {
        RefreshTokenRecord {
            jti: jti.to_string(),
            chain_id: chain_id.to_string(),
            parent_jti: None,
            client_id: "c1".to_string(),
            user_id: "u1".to_string(),
            scope: Scope::parse("openid"),
            auth_time: None,
            issued_at: OffsetDateTime::now_utc(),
            expires_at,
            consumed_at: None,
            revoked_at: None,
        }
    }

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            email_verified: false,
            name: None,
            preferred_username: None,
        }
    }

    #[tokio::test]
    async fn test_code_consume_once() {
        let store = InMemoryAuthStorage::new();
        let now = OffsetDateTime::now_utc();
        AuthorizationCodeStorage::create(&store, &code("h1", now)).await.unwrap();

        assert!(AuthorizationCodeStorage::consume(&store, "h1", now).await.unwrap().is_some());
        assert!(AuthorizationCodeStorage::consume(&store, "h1", now).await.unwrap().is_none());
        assert!(AuthorizationCodeStorage::consume(&store, "missing", now)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_codes() {
        let store = InMemoryAuthStorage::new();
        let now = OffsetDateTime::now_utc();
        AuthorizationCodeStorage::create(&store, &code("old", now - time::Duration::minutes(1)))
            .await
            .unwrap();
        AuthorizationCodeStorage::create(&store, &code("new", now + time::Duration::minutes(1)))
            .await
            .unwrap();

        assert_eq!(AuthorizationCodeStorage::purge_expired(&store, now).await.unwrap(), 1);
        assert_eq!(store.code_count(), 1);
    }

    #[tokio::test]
    async fn test_revoked_chain_accepts_no_new_tokens() {
        let store = InMemoryAuthStorage::new();
        let now = OffsetDateTime::now_utc();
        let later = now + time::Duration::hours(1);
        RefreshTokenStorage::create(&store, &refresh("r1", "chain-a", later))
            .await
            .unwrap();

        assert_eq!(store.revoke_chain("chain-a", now).await.unwrap(), 1);
        let err = RefreshTokenStorage::create(&store, &refresh("r2", "chain-a", later))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        // revoking before anything was stored still closes the chain
        assert_eq!(store.revoke_chain("chain-b", now).await.unwrap(), 0);
        assert!(
            RefreshTokenStorage::create(&store, &refresh("r3", "chain-b", later))
                .await
                .is_err()
        );
        assert!(
            RefreshTokenStorage::create(&store, &refresh("r4", "chain-c", later))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_purge_forgets_expired_chains() {
        let store = InMemoryAuthStorage::new();
        let now = OffsetDateTime::now_utc();
        let expired = now - time::Duration::minutes(1);
        RefreshTokenStorage::create(&store, &refresh("r1", "chain-a", expired))
            .await
            .unwrap();
        store.revoke_chain("chain-a", expired).await.unwrap();

        assert_eq!(RefreshTokenStorage::purge_expired(&store, now).await.unwrap(), 1);
        assert_eq!(store.refresh_token_count(), 0);
        assert!(store.refresh_chains.is_empty());
    }

    #[tokio::test]
    async fn test_email_uniqueness_is_case_insensitive() {
        let store = InMemoryAuthStorage::new();
        UserStorage::create(&store, &user("u1", "Ada@Example.com")).await.unwrap();

        let err = UserStorage::create(&store, &user("u2", "ada@example.COM "))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
        assert!(matches!(err, AuthError::Conflict { .. }));

        let err = UserStorage::create(&store, &user("u1", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict { .. }));
        // the failed insert must not leave its email behind
        assert!(store.find_by_email("other@example.com").await.unwrap().is_none());

        let found = store.find_by_email("ADA@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, "u1");
    }

    #[tokio::test]
    async fn test_session_kinds_do_not_collide() {
        let store = InMemoryAuthStorage::new();
        let now = OffsetDateTime::now_utc();
        let session = Session {
            kind: SessionKind::Administrative,
            token_hash: "same".to_string(),
            user_id: "op".to_string(),
            created_at: now,
            expires_at: now + time::Duration::hours(1),
            last_accessed_at: now,
            user_agent: None,
        };
        SessionStorage::create(&store, &session).await.unwrap();

        assert!(SessionStorage::find(&store, SessionKind::Public, "same")
            .await
            .unwrap()
            .is_none());
        assert!(SessionStorage::find(&store, SessionKind::Administrative, "same")
            .await
            .unwrap()
            .is_some());
    }
}
