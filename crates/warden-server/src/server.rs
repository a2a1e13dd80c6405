use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;
use warden_auth::storage::{
    AuthorizationCodeStorage, ClientStorage, PermissionStorage, RefreshTokenStorage,
    SessionStorage, UserStorage,
};
use warden_auth::{
    AuthConfig, AuthState, AuthorizationCodeManager, ClientRegistry, KeyMaterialProvider,
    PermissionGate, SessionStore, TokenEngine,
};
use warden_auth_memory::InMemoryAuthStorage;
use warden_auth_postgres::PostgresAuthStorage;

use crate::cleanup::{CleanupTargets, spawn_cleanup};
use crate::config::{AppConfig, ServerConfig, StorageBackend};
use crate::middleware as app_middleware;

// =============================================================================
// Service wiring
// =============================================================================

/// One handle per storage trait, all backed by the same store.
pub struct Stores {
    pub clients: Arc<dyn ClientStorage>,
    pub codes: Arc<dyn AuthorizationCodeStorage>,
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,
    pub sessions: Arc<dyn SessionStorage>,
    pub permissions: Arc<dyn PermissionStorage>,
    pub users: Arc<dyn UserStorage>,
}

impl Stores {
    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: ClientStorage
            + AuthorizationCodeStorage
            + RefreshTokenStorage
            + SessionStorage
            + PermissionStorage
            + UserStorage
            + 'static,
    {
        Self {
            clients: store.clone(),
            codes: store.clone(),
            refresh_tokens: store.clone(),
            sessions: store.clone(),
            permissions: store.clone(),
            users: store,
        }
    }
}

/// Every core component, wired once at startup.
#[derive(Clone)]
pub struct Services {
    pub auth: AuthState,
    pub permissions: Arc<PermissionGate>,
    pub users: Arc<dyn UserStorage>,
}

impl Services {
    pub fn new(cfg: &AuthConfig, keys: Arc<KeyMaterialProvider>, stores: Stores) -> Self {
        let timeout = cfg.storage_timeout;
        let clients = Arc::new(ClientRegistry::new(stores.clients, timeout));
        let permissions = Arc::new(PermissionGate::new(stores.permissions, timeout));
        let codes = Arc::new(AuthorizationCodeManager::new(
            clients.clone(),
            permissions.clone(),
            stores.codes,
            cfg.code_settings(),
        ));
        let tokens = Arc::new(TokenEngine::new(
            keys.clone(),
            stores.refresh_tokens,
            stores.users.clone(),
            permissions.clone(),
            cfg.token_settings(),
        ));
        let sessions = Arc::new(SessionStore::new(
            stores.sessions,
            cfg.sessions.clone(),
            timeout,
        ));

        Self {
            auth: AuthState::new(keys, clients, codes, tokens, sessions),
            permissions,
            users: stores.users,
        }
    }

    /// Wires services over a fresh in-memory store.
    pub fn in_memory(cfg: &AuthConfig, keys: Arc<KeyMaterialProvider>) -> Self {
        Self::new(
            cfg,
            keys,
            Stores::from_backend(Arc::new(InMemoryAuthStorage::new())),
        )
    }

    /// Loads key material and connects the configured backend.
    ///
    /// Key material failures are fatal; the caller should exit.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let keys = KeyMaterialProvider::from_config(&cfg.auth.signing)
            .context("failed to load signing keys")?;
        let keys = Arc::new(keys);

        let stores = match cfg.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; all state is lost on restart");
                Stores::from_backend(Arc::new(InMemoryAuthStorage::new()))
            }
            StorageBackend::Postgres => {
                let postgres = &cfg.storage.postgres;
                let storage = PostgresAuthStorage::connect(&postgres.url, postgres.pool_size)
                    .await
                    .context("failed to connect to PostgreSQL")?;
                if postgres.run_migrations {
                    storage.migrate().await.context("failed to run migrations")?;
                }
                tracing::info!(pool_size = postgres.pool_size, "PostgreSQL storage ready");
                Stores::from_backend(Arc::new(storage))
            }
        };

        Ok(Self::new(&cfg.auth, keys, stores))
    }

    pub fn cleanup_targets(&self) -> CleanupTargets {
        CleanupTargets {
            codes: self.auth.codes.clone(),
            tokens: self.auth.tokens.clone(),
            sessions: self.auth.sessions.clone(),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

pub fn build_app(cfg: &ServerConfig, state: AuthState) -> Router {
    warden_auth::router(state)
        .route("/healthz", get(healthz))
        // Middleware stack (order: session cookie -> trace -> body limit)
        .layer(middleware::from_fn(app_middleware::presented_session))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    // path only; authorization requests carry state and PKCE values in the query
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(cfg.body_limit_bytes))
}

async fn healthz() -> &'static str {
    "ok"
}

// =============================================================================
// Server
// =============================================================================

pub struct WardenServer {
    addr: SocketAddr,
    app: Router,
    services: Services,
    cleanup_interval: std::time::Duration,
}

impl WardenServer {
    pub async fn build(cfg: &AppConfig) -> anyhow::Result<Self> {
        let services = Services::from_config(cfg).await?;
        Ok(Self {
            addr: cfg.addr(),
            app: build_app(&cfg.server, services.auth.clone()),
            services,
            cleanup_interval: cfg.storage.cleanup_interval,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let cleanup = spawn_cleanup(self.services.cleanup_targets(), self.cleanup_interval);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        cleanup.abort();
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
