//! Session lifecycle: state machine, startup sequencing and the manager that
//! ties them to the credential store and the remote authority.
//!
//! This module provides:
//! - `SessionMachine`: the single owner of `{status, identity, ready}`
//! - `StartupSequencer`: resolves the stored session and signals readiness
//! - `SessionManager`: login, logout, verification and expiry commands
//! - `AuthContext`: the read-only view for the UI layer

pub mod context;
pub mod manager;
pub mod startup;
pub mod state;

pub use context::{AuthContext, SessionUser};
pub use manager::{NavigationEvent, NavigationHook, SessionManager, SessionOptions};
pub use startup::{StartupOutcome, StartupReport, StartupSequencer};
pub use state::{AuthStatus, Generation, SessionMachine, SessionState, Transition};
