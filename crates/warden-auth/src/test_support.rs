//! In-crate mock storages and fixtures for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::keys::{KeyMaterialProvider, SigningAlgorithm};
use crate::oauth::code::{AuthorizationCodeManager, CodeSettings};
use crate::oauth::grant::GrantService;
use crate::oauth::permission::PermissionGate;
use crate::oauth::registry::{ClientRegistry, NewClient};
use crate::session::SessionStore;
use crate::storage::{
    AuthorizationCodeStorage, ClientStorage, PermissionStorage, RefreshTokenStorage,
    SessionStorage, UserStorage,
};
use crate::token::{TokenEngine, TokenSettings};
use crate::config::SessionConfig;
use crate::types::{
    AuthorizationCode, Client, ClientStatus, GrantType, Permission, PermissionStatus,
    RefreshTokenRecord, Session, SessionKind, User,
};

pub const TIMEOUT: Duration = Duration::from_secs(2);
pub const ISSUER: &str = "https://id.test";
pub const REDIRECT: &str = "https://app.test/callback";

// =============================================================================
// Mock Storages
// =============================================================================

#[derive(Default)]
pub struct MockClientStorage {
    pub clients: RwLock<HashMap<String, Client>>,
}

#[async_trait]
impl ClientStorage for MockClientStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.read().unwrap().get(client_id).cloned())
    }

    async fn create(&self, client: &Client) -> AuthResult<()> {
        let mut clients = self.clients.write().unwrap();
        if clients.contains_key(&client.client_id) {
            return Err(AuthError::conflict("client exists"));
        }
        clients.insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn set_status(&self, client_id: &str, status: ClientStatus) -> AuthResult<bool> {
        Ok(match self.clients.write().unwrap().get_mut(client_id) {
            Some(client) => {
                client.status = status;
                true
            }
            None => false,
        })
    }

    async fn set_secret_hash(&self, client_id: &str, secret_hash: &str) -> AuthResult<bool> {
        Ok(match self.clients.write().unwrap().get_mut(client_id) {
            Some(client) => {
                client.secret_hash = Some(secret_hash.to_string());
                true
            }
            None => false,
        })
    }

    async fn list(&self, limit: i64, offset: i64) -> AuthResult<Vec<Client>> {
        let mut clients: Vec<Client> = self.clients.read().unwrap().values().cloned().collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(clients
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[derive(Default)]
pub struct MockCodeStorage {
    pub codes: RwLock<HashMap<String, AuthorizationCode>>,
}

#[async_trait]
impl AuthorizationCodeStorage for MockCodeStorage {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        self.codes
            .write()
            .unwrap()
            .insert(code.code_hash.clone(), code.clone());
        Ok(())
    }

    async fn consume(
        &self,
        code_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<AuthorizationCode>> {
        let mut codes = self.codes.write().unwrap();
        match codes.get_mut(code_hash) {
            Some(code) if !code.used => {
                code.used = true;
                code.used_at = Some(now);
                Ok(Some(code.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut codes = self.codes.write().unwrap();
        let before = codes.len();
        codes.retain(|_, c| c.expires_at > now);
        Ok((before - codes.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockRefreshStorage {
    pub records: RwLock<HashMap<String, RefreshTokenRecord>>,
    pub revoked_chains: RwLock<HashSet<String>>,
}

#[async_trait]
impl RefreshTokenStorage for MockRefreshStorage {
    async fn create(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        let mut records = self.records.write().unwrap();
        if self.revoked_chains.read().unwrap().contains(&record.chain_id) {
            return Err(AuthError::invalid_grant("chain revoked"));
        }
        records.insert(record.jti.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, jti: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self.records.read().unwrap().get(jti).cloned())
    }

    async fn consume(
        &self,
        jti: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<RefreshTokenRecord>> {
        let mut records = self.records.write().unwrap();
        match records.get_mut(jti) {
            Some(record) if record.consumed_at.is_none() && record.revoked_at.is_none() => {
                record.consumed_at = Some(now);
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revoke_chain(&self, chain_id: &str, now: OffsetDateTime) -> AuthResult<u64> {
        let mut records = self.records.write().unwrap();
        self.revoked_chains
            .write()
            .unwrap()
            .insert(chain_id.to_string());
        let mut count = 0;
        for record in records.values_mut() {
            if record.chain_id == chain_id && record.revoked_at.is_none() {
                record.revoked_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|_, r| r.expires_at > now);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockSessionStorage {
    pub sessions: RwLock<HashMap<(SessionKind, String), Session>>,
}

#[async_trait]
impl SessionStorage for MockSessionStorage {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        self.sessions
            .write()
            .unwrap()
            .insert((session.kind, session.token_hash.clone()), session.clone());
        Ok(())
    }

    async fn find(&self, kind: SessionKind, token_hash: &str) -> AuthResult<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .unwrap()
            .get(&(kind, token_hash.to_string()))
            .cloned())
    }

    async fn touch(
        &self,
        kind: SessionKind,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<()> {
        if let Some(session) = self
            .sessions
            .write()
            .unwrap()
            .get_mut(&(kind, token_hash.to_string()))
        {
            session.last_accessed_at = now;
        }
        Ok(())
    }

    async fn delete(&self, kind: SessionKind, token_hash: &str) -> AuthResult<bool> {
        Ok(self
            .sessions
            .write()
            .unwrap()
            .remove(&(kind, token_hash.to_string()))
            .is_some())
    }

    async fn delete_by_user(&self, kind: SessionKind, user_id: &str) -> AuthResult<u64> {
        let mut sessions = self.sessions.write().unwrap();
        let before = sessions.len();
        sessions.retain(|(k, _), s| !(*k == kind && s.user_id == user_id));
        Ok((before - sessions.len()) as u64)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut sessions = self.sessions.write().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockPermissionStorage {
    pub records: RwLock<HashMap<(String, String), Permission>>,
}

impl MockPermissionStorage {
    fn blank(user_id: &str, client_id: &str, now: OffsetDateTime) -> Permission {
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
}

#[async_trait]
impl PermissionStorage for MockPermissionStorage {
    async fn find(&self, user_id: &str, client_id: &str) -> AuthResult<Option<Permission>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .get(&(user_id.to_string(), client_id.to_string()))
            .cloned())
    }

    async fn upsert_request(
        &self,
        user_id: &str,
        client_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission> {
        let mut records = self.records.write().unwrap();
        let record = records
            .entry((user_id.to_string(), client_id.to_string()))
            .or_insert_with(|| {
                let mut p = Self::blank(user_id, client_id, now);
                p.requested_at = Some(now);
                p
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
        let mut records = self.records.write().unwrap();
        let record = records
            .entry((user_id.to_string(), client_id.to_string()))
            .or_insert_with(|| Self::blank(user_id, client_id, now));
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
        let mut records = self.records.write().unwrap();
        let record = records
            .entry((user_id.to_string(), client_id.to_string()))
            .or_insert_with(|| Self::blank(user_id, client_id, now));
        record.access = false;
        record.status = PermissionStatus::Revoked;
        record.revoked_at = Some(now);
        record.revoked_by = Some(actor.to_string());
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn list_by_client(&self, client_id: &str) -> AuthResult<Vec<Permission>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|p| p.client_id == client_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockUserStorage {
    pub users: RwLock<HashMap<String, User>>,
}

#[async_trait]
impl UserStorage for MockUserStorage {
    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.read().unwrap().get(user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| u.normalized_email() == email)
            .cloned())
    }

    async fn create(&self, user: &User) -> AuthResult<()> {
        let mut users = self.users.write().unwrap();
        if users.contains_key(&user.id)
            || users
                .values()
                .any(|u| u.normalized_email() == user.normalized_email())
        {
            return Err(AuthError::conflict("user exists"));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Every component wired over mock storages.
pub struct Harness {
    pub clients: Arc<ClientRegistry>,
    pub permissions: Arc<PermissionGate>,
    pub codes: Arc<AuthorizationCodeManager>,
    pub tokens: Arc<TokenEngine>,
    pub sessions: Arc<SessionStore>,
    pub grants: GrantService,
    pub keys: Arc<KeyMaterialProvider>,
    pub code_storage: Arc<MockCodeStorage>,
    pub refresh_storage: Arc<MockRefreshStorage>,
    pub user_storage: Arc<MockUserStorage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_code_lifetime(Duration::from_secs(600))
    }

    pub fn with_code_lifetime(code_lifetime: Duration) -> Self {
        let keys = Arc::new(
            KeyMaterialProvider::generate("test-key", SigningAlgorithm::ES384).unwrap(),
        );
        let code_storage = Arc::new(MockCodeStorage::default());
        let refresh_storage = Arc::new(MockRefreshStorage::default());
        let user_storage = Arc::new(MockUserStorage::default());

        let clients = Arc::new(ClientRegistry::new(
            Arc::new(MockClientStorage::default()),
            TIMEOUT,
        ));
        let permissions = Arc::new(PermissionGate::new(
            Arc::new(MockPermissionStorage::default()),
            TIMEOUT,
        ));
        let codes = Arc::new(AuthorizationCodeManager::new(
            clients.clone(),
            permissions.clone(),
            code_storage.clone(),
            CodeSettings {
                lifetime: code_lifetime,
                allow_plain_pkce: false,
                storage_timeout: TIMEOUT,
            },
        ));
        let tokens = Arc::new(TokenEngine::new(
            keys.clone(),
            refresh_storage.clone(),
            user_storage.clone(),
            permissions.clone(),
            TokenSettings {
                issuer: ISSUER.to_string(),
                access_token_lifetime: Duration::from_secs(3600),
                id_token_lifetime: Duration::from_secs(3600),
                refresh_token_lifetime: Duration::from_secs(86400),
                revoke_chain_on_replay: true,
                storage_timeout: TIMEOUT,
            },
        ));
        let sessions = Arc::new(SessionStore::new(
            Arc::new(MockSessionStorage::default()),
            SessionConfig::default(),
            TIMEOUT,
        ));
        let grants = GrantService::new(clients.clone(), codes.clone(), tokens.clone());

        Self {
            clients,
            permissions,
            codes,
            tokens,
            sessions,
            grants,
            keys,
            code_storage,
            refresh_storage,
            user_storage,
        }
    }

    /// Registers a confidential client and returns `(client_id, secret)`.
    pub async fn confidential_client(&self) -> (String, String) {
        let registered = self
            .clients
            .register(NewClient {
                name: "Confidential".to_string(),
                redirect_uris: vec![REDIRECT.to_string()],
                allowed_scopes: Vec::new(),
                grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
                confidential: true,
                pkce_required: false,
            })
            .await
            .unwrap();
        (
            registered.client.client_id,
            registered.client_secret.unwrap(),
        )
    }

    /// Registers a public, PKCE-required client and returns its id.
    pub async fn public_client(&self) -> String {
        self.clients
            .register(NewClient {
                name: "Public".to_string(),
                redirect_uris: vec![REDIRECT.to_string()],
                allowed_scopes: Vec::new(),
                grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
                confidential: false,
                pkce_required: true,
            })
            .await
            .unwrap()
            .client
            .client_id
    }

    pub async fn add_user(&self, id: &str) {
        self.user_storage
            .create(&User {
                id: id.to_string(),
                email: format!("{id}@example.com"),
                email_verified: true,
                name: Some(format!("User {id}")),
                preferred_username: Some(id.to_string()),
            })
            .await
            .unwrap();
    }

    pub async fn allow(&self, user_id: &str, client_id: &str) {
        self.permissions
            .grant(user_id, client_id, "member", "admin@test")
            .await
            .unwrap();
    }
}
