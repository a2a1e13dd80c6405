//! Periodic removal of expired codes, refresh tokens and sessions.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use warden_auth::{AuthorizationCodeManager, SessionStore, TokenEngine};

/// Components whose expired records are purged.
#[derive(Clone)]
pub struct CleanupTargets {
    pub codes: Arc<AuthorizationCodeManager>,
    pub tokens: Arc<TokenEngine>,
    pub sessions: Arc<SessionStore>,
}

/// Records removed by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub codes: u64,
    pub refresh_tokens: u64,
    pub sessions: u64,
}

impl CleanupTargets {
    /// Runs one sweep. A failing store is logged and skipped.
    pub async fn sweep(&self, now: OffsetDateTime) -> SweepReport {
        let mut report = SweepReport::default();

        match self.codes.purge_expired(now).await {
            Ok(n) => report.codes = n,
            Err(e) => tracing::warn!(error = %e, "Failed to purge authorization codes"),
        }
        match self.tokens.purge_expired(now).await {
            Ok(n) => report.refresh_tokens = n,
            Err(e) => tracing::warn!(error = %e, "Failed to purge refresh tokens"),
        }
        match self.sessions.purge_expired(now).await {
            Ok(n) => report.sessions = n,
            Err(e) => tracing::warn!(error = %e, "Failed to purge sessions"),
        }

        if report != SweepReport::default() {
            tracing::info!(
                codes = report.codes,
                refresh_tokens = report.refresh_tokens,
                sessions = report.sessions,
                "Expired records purged"
            );
        }
        report
    }
}

/// Spawns the sweep loop. Abort the handle to stop it.
pub fn spawn_cleanup(targets: CleanupTargets, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            targets.sweep(OffsetDateTime::now_utc()).await;
        }
    })
}
