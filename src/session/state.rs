//! The session state machine.
//!
//! One `SessionMachine` owns the `{status, identity, ready}` triad. Readers get
//! cloned snapshots or a `watch::Receiver`; every write swaps the triad in one
//! critical section so no reader ever sees a half-applied transition.
//! Command commits are serialized by a separate lock, so storage I/O runs
//! without holding the state lock readers borrow.
//!
//! ```text
//! Initializing --resolve_startup--> Authenticated | Unauthenticated
//! Authenticated | Unauthenticated --login--> Authenticated
//! Authenticated | Unauthenticated --logout/expiry--> Unauthenticated
//! ```
//!
//! Commands that suspend (login, logout) take a generation from
//! [`SessionMachine::begin_command`] before they start. When they finish, their
//! result is applied only if no command with a newer generation has been
//! applied in the meantime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::auth::Claims;
use crate::error::SessionResult;

/// Monotonic tag attached to each in-flight command.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthStatus {
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// Outcome of a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// A newer command already completed; this result was discarded
    Stale,
    /// Not allowed from the current status
    Refused,
    /// The guard did not hold, nothing to do
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    status: AuthStatus,
    identity: Option<Claims>,
    ready: bool,
    generation: Generation,
}

impl SessionState {
    fn initializing() -> Self {
        Self {
            status: AuthStatus::Initializing,
            identity: None,
            ready: false,
            generation: 0,
        }
    }

    pub fn status(&self) -> AuthStatus {
        self.status
    }

    pub fn identity(&self) -> Option<&Claims> {
        self.identity.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }

    /// Generation of the last command applied to this state.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    fn set_identity(&mut self, identity: Option<Claims>) {
        self.status = if identity.is_some() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Unauthenticated
        };
        self.identity = identity;
    }
}

pub struct SessionMachine {
    state: watch::Sender<SessionState>,
    next_generation: AtomicU64,
    commit_lock: Mutex<()>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::initializing());
        Self {
            state,
            next_generation: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    // ===== Read surface =====

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> AuthStatus {
        self.state.borrow().status
    }

    pub fn identity(&self) -> Option<Claims> {
        self.state.borrow().identity.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    /// Receiver that is notified on every applied transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    // ===== Commands =====

    /// Reserve the generation for a command about to start.
    pub fn begin_command(&self) -> Generation {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Leave `Initializing`. Only the first call has any effect.
    pub fn resolve_startup(&self, identity: Option<Claims>) -> Transition {
        let mut outcome = Transition::Refused;
        self.state.send_if_modified(|state| {
            if state.status != AuthStatus::Initializing {
                return false;
            }
            state.set_identity(identity);
            outcome = Transition::Applied;
            true
        });
        if outcome == Transition::Refused {
            warn!("Startup already resolved; ignoring");
        }
        outcome
    }

    pub fn apply_login_result(&self, generation: Generation, claims: Claims) -> Transition {
        self.commit(generation, Some(claims), |_| true, || Ok(()))
            .unwrap_or(Transition::Refused)
    }

    pub fn apply_logout_or_expiry(&self, generation: Generation) -> Transition {
        self.commit(generation, None, |_| true, || Ok(()))
            .unwrap_or(Transition::Refused)
    }

    /// Flip `ready` to true. Returns false if it was already set or startup
    /// has not resolved yet.
    pub fn mark_ready(&self) -> bool {
        let mut flipped = false;
        self.state.send_if_modified(|state| {
            if state.ready || state.status == AuthStatus::Initializing {
                return false;
            }
            state.ready = true;
            flipped = true;
            true
        });
        if !flipped {
            warn!(status = ?self.status(), "mark_ready ignored");
        }
        flipped
    }

    /// Apply `next` as the new identity if `generation` is current and `guard`
    /// holds, running `persist` first. Commits are serialized by the commit
    /// lock; if `persist` fails the state is left untouched.
    pub(crate) fn commit(
        &self,
        generation: Generation,
        next: Option<Claims>,
        guard: impl FnOnce(&SessionState) -> bool,
        persist: impl FnOnce() -> SessionResult<()>,
    ) -> SessionResult<Transition> {
        let _serial = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Only commits change status or generation once startup has resolved,
        // and they all hold the commit lock
        let decision = {
            let state = self.state.borrow();
            if state.status == AuthStatus::Initializing {
                Transition::Refused
            } else if generation <= state.generation {
                Transition::Stale
            } else if !guard(&*state) {
                Transition::Skipped
            } else {
                Transition::Applied
            }
        };

        let outcome = match decision {
            Transition::Applied => match persist() {
                Ok(()) => {
                    self.state.send_modify(|state| {
                        state.generation = generation;
                        state.set_identity(next);
                    });
                    Ok(Transition::Applied)
                }
                Err(e) => Err(e),
            },
            other => Ok(other),
        };
        debug!(generation, outcome = ?outcome, "Session command committed");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;

    fn claims(user: &str) -> Claims {
        Claims {
            user_id: user.to_string(),
            email: Some(format!("{}@example.com", user)),
            role: Some("user".to_string()),
            exp_ms: i64::MAX,
        }
    }

    fn started(identity: Option<Claims>) -> SessionMachine {
        let machine = SessionMachine::new();
        assert_eq!(machine.resolve_startup(identity), Transition::Applied);
        machine
    }

    #[test]
    fn test_new_machine_is_initializing() {
        let machine = SessionMachine::new();
        let state = machine.snapshot();
        assert_eq!(state.status(), AuthStatus::Initializing);
        assert!(state.identity().is_none());
        assert!(!state.is_ready());
    }

    #[test]
    fn test_resolve_startup_only_once() {
        let machine = started(Some(claims("a")));
        assert_eq!(machine.status(), AuthStatus::Authenticated);
        assert_eq!(machine.resolve_startup(None), Transition::Refused);
        assert_eq!(machine.status(), AuthStatus::Authenticated);
    }

    #[test]
    fn test_commands_refused_while_initializing() {
        let machine = SessionMachine::new();
        let gen = machine.begin_command();
        assert_eq!(machine.apply_login_result(gen, claims("a")), Transition::Refused);
        assert_eq!(machine.apply_logout_or_expiry(gen), Transition::Refused);
        assert!(!machine.mark_ready());
        assert_eq!(machine.status(), AuthStatus::Initializing);
    }

    #[test]
    fn test_mark_ready_flips_once() {
        let machine = started(None);
        assert!(machine.mark_ready());
        assert!(!machine.mark_ready());
        assert!(machine.is_ready());
    }

    #[test]
    fn test_login_then_logout() {
        let machine = started(None);

        let gen = machine.begin_command();
        assert_eq!(machine.apply_login_result(gen, claims("a")), Transition::Applied);
        assert!(machine.snapshot().is_authenticated());
        assert_eq!(machine.identity().unwrap().user_id, "a");

        let gen = machine.begin_command();
        assert_eq!(machine.apply_logout_or_expiry(gen), Transition::Applied);
        let state = machine.snapshot();
        assert_eq!(state.status(), AuthStatus::Unauthenticated);
        assert!(state.identity().is_none());
    }

    #[test]
    fn test_stale_result_is_discarded() {
        let machine = started(None);

        let slow_login = machine.begin_command();
        let logout = machine.begin_command();

        assert_eq!(machine.apply_logout_or_expiry(logout), Transition::Applied);
        assert_eq!(machine.apply_login_result(slow_login, claims("a")), Transition::Stale);
        assert_eq!(machine.status(), AuthStatus::Unauthenticated);
        assert_eq!(machine.snapshot().generation(), logout);
    }

    #[test]
    fn test_last_completed_wins() {
        let machine = started(None);

        let first = machine.begin_command();
        let second = machine.begin_command();

        assert_eq!(machine.apply_login_result(first, claims("a")), Transition::Applied);
        assert_eq!(machine.apply_login_result(second, claims("b")), Transition::Applied);
        assert_eq!(machine.identity().unwrap().user_id, "b");
    }

    #[test]
    fn test_failed_persist_leaves_state_untouched() {
        let machine = started(None);
        let before = machine.snapshot();

        let gen = machine.begin_command();
        let result = machine.commit(gen, Some(claims("a")), |_| true, || {
            Err(SessionError::Storage("disk full".to_string()))
        });

        assert_eq!(result, Err(SessionError::Storage("disk full".to_string())));
        assert_eq!(machine.snapshot(), before);
    }

    #[test]
    fn test_guard_skips_without_side_effect() {
        let machine = started(Some(claims("a")));
        let gen = machine.begin_command();
        let mut persisted = false;
        let result = machine.commit(gen, None, |_| false, || {
            persisted = true;
            Ok(())
        });
        assert_eq!(result, Ok(Transition::Skipped));
        assert!(!persisted);
        assert!(machine.snapshot().is_authenticated());
    }

    #[test]
    fn test_readers_not_blocked_during_persist() {
        let machine = started(None);
        let gen = machine.begin_command();
        let mut seen = None;
        let result = machine.commit(gen, Some(claims("a")), |_| true, || {
            seen = Some(machine.snapshot().status());
            Ok(())
        });
        assert_eq!(result, Ok(Transition::Applied));
        assert_eq!(seen, Some(AuthStatus::Unauthenticated));
        assert!(machine.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let machine = started(None);
        let mut rx = machine.subscribe();

        machine.mark_ready();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_ready());

        let gen = machine.begin_command();
        machine.apply_login_result(gen, claims("a"));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_authenticated());
    }
}
