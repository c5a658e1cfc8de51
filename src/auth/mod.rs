//! Credential persistence and token decoding.
//!
//! This module provides:
//! - `CredentialStore`: the single stored bearer token, with keychain, file
//!   and in-memory backends
//! - `token`: untrusted decoding of token claims and expiry checks

pub mod credentials;
pub mod token;

pub use credentials::{CredentialStore, FileStore, KeyringStore, MemoryStore};
pub use token::{decode, is_expired, Claims};
