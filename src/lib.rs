//! Sessionkeeper - client-side session lifecycle management.
//!
//! Tracks whether a user is signed in, keeps the bearer credential across
//! restarts, and coordinates sign-in, sign-out and session checks with a
//! remote authentication authority.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;

pub use api::{LoginRequest, SessionClient};
pub use auth::{Claims, CredentialStore};
pub use config::Config;
pub use error::{SessionError, SessionResult};
pub use session::{AuthContext, AuthStatus, SessionManager, SessionState, SessionUser};
