use thiserror::Error;

/// Generic message shown when the authority rejects a login without saying why.
pub const GENERIC_LOGIN_FAILURE: &str = "Login failed";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("{0}")]
    AuthRejected(String),

    #[error("Unable to reach the authentication server: {0}")]
    NetworkUnavailable(String),

    #[error("Remote logout failed: {0}")]
    RemoteLogoutFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("A newer session command completed first")]
    Superseded,

    #[error("Session is still initializing")]
    NotReady,
}

impl SessionError {
    /// Message suitable for showing to the user next to a login form.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::AuthRejected(msg) => msg.clone(),
            SessionError::NetworkUnavailable(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Wrap a credential backend failure, keeping its context chain.
    pub fn storage(e: anyhow::Error) -> Self {
        SessionError::Storage(format!("{:#}", e))
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::NetworkUnavailable(e.to_string())
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
