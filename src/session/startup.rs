//! Startup sequencing.
//!
//! Reads the stored credential, resolves the initial session state and only
//! then signals readiness. Resolution runs alongside a timer started at the
//! beginning of the sequence; readiness waits for both, so the loader is shown
//! for at least `min_loading` however fast resolution is.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::auth;

use super::manager::SessionManager;
use super::state::AuthStatus;

/// Which startup branch was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Nothing stored
    NoCredential,
    /// Stored token decoded and still valid
    Restored,
    /// Stored token decoded but past its expiry; discarded
    Expired,
    /// Stored token could not be decoded; discarded
    Malformed,
    /// Startup had already been resolved by an earlier run
    AlreadyResolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    pub outcome: StartupOutcome,
    /// Wall-clock time from sequence start until readiness was signalled
    pub elapsed: Duration,
}

pub struct StartupSequencer<'a> {
    manager: &'a SessionManager,
    min_loading: Duration,
}

impl<'a> StartupSequencer<'a> {
    pub fn new(manager: &'a SessionManager) -> Self {
        Self {
            manager,
            min_loading: manager.options().min_loading,
        }
    }

    pub fn min_loading(mut self, min_loading: Duration) -> Self {
        self.min_loading = min_loading;
        self
    }

    pub async fn run(self) -> StartupReport {
        let started = Instant::now();

        if self.manager.machine().status() != AuthStatus::Initializing {
            warn!("Startup sequence already ran");
            return StartupReport {
                outcome: StartupOutcome::AlreadyResolved,
                elapsed: started.elapsed(),
            };
        }

        let (outcome, ()) = tokio::join!(self.resolve(), tokio::time::sleep(self.min_loading));

        self.manager.machine().mark_ready();
        let elapsed = started.elapsed();
        info!(
            ?outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            min_loading_ms = self.min_loading.as_millis() as u64,
            "Session ready"
        );

        StartupReport { outcome, elapsed }
    }

    async fn resolve(&self) -> StartupOutcome {
        let machine = self.manager.machine();

        let Some(token) = self.manager.store().get() else {
            debug!("No stored credential");
            machine.resolve_startup(None);
            return StartupOutcome::NoCredential;
        };

        match auth::decode(&token) {
            Ok(claims) if !auth::is_expired(&claims, Utc::now()) => {
                debug!(user_id = %claims.user_id, "Restored stored session");
                machine.resolve_startup(Some(claims));
                StartupOutcome::Restored
            }
            Ok(claims) => {
                info!(user_id = %claims.user_id, "Stored session has expired");
                self.discard(&token).await;
                StartupOutcome::Expired
            }
            Err(e) => {
                warn!(error = %e, "Stored credential is unreadable");
                self.discard(&token).await;
                StartupOutcome::Malformed
            }
        }
    }

    /// Local logout for a stale stored token, plus the opt-in remote call.
    async fn discard(&self, token: &str) {
        let options = self.manager.options();
        if options.remote_logout_on_stale_token {
            match tokio::time::timeout(
                options.remote_logout_timeout,
                self.manager.client().logout(Some(token)),
            )
            .await
            {
                Ok(Ok(())) => debug!("Remote logout for stale token acknowledged"),
                Ok(Err(e)) => debug!(error = %e, "Remote logout for stale token failed"),
                Err(_) => debug!("Remote logout for stale token timed out"),
            }
        }

        if let Err(e) = self.manager.store().clear() {
            error!(error = %e, "Failed to clear stale credential");
        }
        self.manager.machine().resolve_startup(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    use crate::api::SessionClient;
    use crate::auth::{CredentialStore, MemoryStore};
    use crate::session::manager::SessionOptions;

    const MIN_LOADING: Duration = Duration::from_millis(60);

    fn token_expiring_at(exp: i64) -> String {
        let payload = serde_json::json!({"user_id": "u1", "email": "u1@example.com", "role": "user", "exp": exp});
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    fn manager_with(store: Arc<MemoryStore>) -> SessionManager {
        let options = SessionOptions {
            min_loading: MIN_LOADING,
            remote_logout_timeout: Duration::from_millis(200),
            remote_logout_on_stale_token: false,
        };
        let client = SessionClient::with_base_url("http://127.0.0.1:9").unwrap();
        SessionManager::new(options, store, client)
    }

    #[tokio::test]
    async fn test_no_credential_waits_minimum_delay() {
        let manager = manager_with(Arc::new(MemoryStore::new()));

        let report = manager.start().await;

        assert_eq!(report.outcome, StartupOutcome::NoCredential);
        assert!(report.elapsed >= MIN_LOADING);
        let state = manager.state();
        assert_eq!(state.status(), AuthStatus::Unauthenticated);
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_valid_credential_restores_identity() {
        let exp = (Utc::now() + chrono::Duration::hours(1)).timestamp();
        let token = token_expiring_at(exp);
        let store = Arc::new(MemoryStore::with_token(token.clone()));
        let manager = manager_with(Arc::clone(&store));

        let report = manager.start().await;

        assert_eq!(report.outcome, StartupOutcome::Restored);
        let state = manager.state();
        assert_eq!(state.status(), AuthStatus::Authenticated);
        assert_eq!(state.identity().unwrap().user_id, "u1");
        assert_eq!(store.get(), Some(token));
    }

    #[tokio::test]
    async fn test_expired_credential_is_cleared() {
        let exp = (Utc::now() - chrono::Duration::minutes(1)).timestamp();
        let store = Arc::new(MemoryStore::with_token(token_expiring_at(exp)));
        let manager = manager_with(Arc::clone(&store));

        let report = manager.start().await;

        assert_eq!(report.outcome, StartupOutcome::Expired);
        assert_eq!(store.get(), None);
        let state = manager.state();
        assert_eq!(state.status(), AuthStatus::Unauthenticated);
        assert!(state.identity().is_none());
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_malformed_credential_is_cleared() {
        let store = Arc::new(MemoryStore::with_token("garbage"));
        let manager = manager_with(Arc::clone(&store));

        let report = manager.start().await;

        assert_eq!(report.outcome, StartupOutcome::Malformed);
        assert_eq!(store.get(), None);
        assert_eq!(manager.state().status(), AuthStatus::Unauthenticated);
        assert!(manager.state().is_ready());
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        manager.start().await;

        let report = manager.start().await;
        assert_eq!(report.outcome, StartupOutcome::AlreadyResolved);
        assert!(manager.state().is_ready());
    }

    #[tokio::test]
    async fn test_ready_never_observed_before_resolution() {
        let manager = Arc::new(manager_with(Arc::new(MemoryStore::new())));
        let mut rx = manager.subscribe();

        let watcher = tokio::spawn(async move {
            let mut ready_seen = 0;
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                if state.is_ready() {
                    assert_ne!(state.status(), AuthStatus::Initializing);
                    ready_seen += 1;
                    break;
                }
            }
            ready_seen
        });

        let started = Instant::now();
        manager.start().await;
        assert!(started.elapsed() >= MIN_LOADING);

        assert_eq!(watcher.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_min_loading_override() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let report = StartupSequencer::new(&manager)
            .min_loading(Duration::ZERO)
            .run()
            .await;
        assert_eq!(report.outcome, StartupOutcome::NoCredential);
        assert!(report.elapsed < MIN_LOADING * 10);
    }
}
