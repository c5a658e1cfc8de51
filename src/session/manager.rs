//! Session manager: the commands the UI issues and the state it reads.
//!
//! `SessionManager` owns the state machine, the credential store and the
//! remote client. Construct one at process start and share it (usually as an
//! `Arc<SessionManager>`); there is no global instance.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{LoginRequest, SessionClient};
use crate::auth::{self, CredentialStore};
use crate::config::Config;
use crate::error::{SessionError, SessionResult};

use super::context::{AuthContext, SessionUser};
use super::startup::{StartupReport, StartupSequencer};
use super::state::{Generation, SessionMachine, SessionState, Transition};

/// Navigation side effects raised towards the routing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEvent {
    SignedIn,
    SignedOut,
    SessionExpired,
}

pub type NavigationHook = Arc<dyn Fn(NavigationEvent) + Send + Sync>;

/// Tunables for the lifecycle, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub min_loading: Duration,
    pub remote_logout_timeout: Duration,
    pub remote_logout_on_stale_token: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            min_loading: config.min_loading(),
            remote_logout_timeout: config.remote_logout_timeout(),
            remote_logout_on_stale_token: config.remote_logout_on_stale_token,
        }
    }
}

pub struct SessionManager {
    machine: SessionMachine,
    store: Arc<dyn CredentialStore>,
    client: SessionClient,
    options: SessionOptions,
    navigation: Option<NavigationHook>,
}

impl SessionManager {
    pub fn new(options: SessionOptions, store: Arc<dyn CredentialStore>, client: SessionClient) -> Self {
        Self {
            machine: SessionMachine::new(),
            store,
            client,
            options,
            navigation: None,
        }
    }

    /// Build a manager with the configured backend and endpoints.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = config.credential_store()?;
        let client = SessionClient::new(config)?;
        Ok(Self::new(SessionOptions::from(config), store, client))
    }

    /// Register the routing callback invoked after sign-in and teardown.
    pub fn with_navigation(mut self, hook: impl Fn(NavigationEvent) + Send + Sync + 'static) -> Self {
        self.navigation = Some(Arc::new(hook));
        self
    }

    // =========================================================================
    // Read surface
    // =========================================================================

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn state(&self) -> SessionState {
        self.machine.snapshot()
    }

    pub fn context(&self) -> AuthContext {
        AuthContext::from(&self.machine.snapshot())
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.machine.subscribe()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub(crate) fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub(crate) fn client(&self) -> &SessionClient {
        &self.client
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Resolve the stored session and signal readiness. Call once at startup.
    pub async fn start(&self) -> StartupReport {
        StartupSequencer::new(self).run().await
    }

    /// Sign in against the authority.
    ///
    /// On success the token is stored and the session becomes authenticated.
    /// On any failure the state is left as it was.
    pub async fn login(&self, request: &LoginRequest) -> SessionResult<SessionUser> {
        if !self.machine.is_ready() {
            return Err(SessionError::NotReady);
        }
        let generation = self.machine.begin_command();

        let token = self.client.login(request).await?;
        let claims = auth::decode(&token)?;
        if auth::is_expired(&claims, Utc::now()) {
            warn!(generation, "Authority issued an already expired token");
            return Err(SessionError::InvalidResponse("token is already expired".to_string()));
        }
        let user = SessionUser::from(&claims);

        let store = &self.store;
        let outcome = self.machine.commit(
            generation,
            Some(claims),
            |_| true,
            || store.put(&token).map_err(SessionError::storage),
        )?;

        match outcome {
            Transition::Applied => {
                info!(generation, user_id = %user.id, "Login successful");
                self.navigate(NavigationEvent::SignedIn);
                Ok(user)
            }
            Transition::Stale => {
                debug!(generation, "Login result superseded");
                Err(SessionError::Superseded)
            }
            Transition::Refused | Transition::Skipped => Err(SessionError::NotReady),
        }
    }

    /// Sign out. The remote call is advisory; local teardown always runs
    /// unless a newer command completed while the remote call was pending.
    ///
    /// Refused with [`SessionError::NotReady`] before startup has resolved,
    /// without touching the store or the network.
    pub async fn logout(&self) -> SessionResult<()> {
        if !self.machine.is_ready() {
            return Err(SessionError::NotReady);
        }
        let generation = self.machine.begin_command();
        let token = self.store.get();

        match tokio::time::timeout(
            self.options.remote_logout_timeout,
            self.client.logout(token.as_deref()),
        )
        .await
        {
            Ok(Ok(())) => debug!("Remote logout acknowledged"),
            Ok(Err(e)) => warn!(error = %e, "Remote logout failed; continuing with local logout"),
            Err(_) => warn!(
                timeout_ms = self.options.remote_logout_timeout.as_millis() as u64,
                "Remote logout timed out; continuing with local logout"
            ),
        }

        match self.teardown(generation, |_| true, NavigationEvent::SignedOut) {
            Transition::Refused => Err(SessionError::NotReady),
            Transition::Applied | Transition::Stale | Transition::Skipped => Ok(()),
        }
    }

    /// Ask the authority whether the stored credential is still accepted.
    /// Never fails; local state is not touched. False until startup has
    /// resolved.
    pub async fn verify_session(&self) -> bool {
        if !self.machine.is_ready() {
            return false;
        }
        match self.store.get() {
            Some(token) => self.client.verify_session(&token).await,
            None => false,
        }
    }

    /// Like [`verify_session`](Self::verify_session), but tears the local
    /// session down when the authority no longer accepts it.
    pub async fn verify_and_invalidate(&self) -> bool {
        if !self.machine.is_ready() {
            return false;
        }
        let generation = self.machine.begin_command();
        let valid = self.verify_session().await;
        if !valid {
            self.teardown(
                generation,
                |state| state.is_authenticated(),
                NavigationEvent::SessionExpired,
            );
        }
        valid
    }

    /// Tear the session down if the held identity has expired at `now`.
    /// Returns true if a teardown happened.
    pub fn check_expiry(&self, now: DateTime<Utc>) -> bool {
        if !self.machine.is_ready() {
            return false;
        }
        let generation = self.machine.begin_command();
        let outcome = self.teardown(
            generation,
            |state| state.identity().is_some_and(|c| auth::is_expired(c, now)),
            NavigationEvent::SessionExpired,
        );
        outcome == Transition::Applied
    }

    /// Clear the store and move to `Unauthenticated` if `guard` holds.
    fn teardown(
        &self,
        generation: Generation,
        guard: impl FnOnce(&SessionState) -> bool,
        event: NavigationEvent,
    ) -> Transition {
        let store = &self.store;
        let outcome = self
            .machine
            .commit(generation, None, guard, || {
                if let Err(e) = store.clear() {
                    // Local logout still wins; a leftover token fails decode or
                    // expiry at the next startup at worst
                    error!(error = %e, "Failed to clear stored credential");
                }
                Ok(())
            })
            .unwrap_or(Transition::Refused);

        match outcome {
            Transition::Applied => {
                info!(generation, ?event, "Session ended");
                self.navigate(event);
            }
            Transition::Stale => debug!(generation, "Teardown superseded by a newer command"),
            Transition::Refused => warn!(generation, "Teardown refused while initializing"),
            Transition::Skipped => {}
        }
        outcome
    }

    fn navigate(&self, event: NavigationEvent) {
        if let Some(ref hook) = self.navigation {
            hook(event);
        }
    }
}
