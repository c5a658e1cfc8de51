//! HTTP client for the remote authentication authority.
//!
//! This module provides the `SessionClient` for the login, logout and
//! verify endpoints. Verification uses JWT bearer token authentication.

pub mod client;
pub mod error;

pub use client::{LoginRequest, SessionClient};
pub use error::ApiError;
