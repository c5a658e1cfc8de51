use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::error::{SessionError, GENERIC_LOGIN_FAILURE};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Rejected with status {status}: {}", message.as_deref().unwrap_or("no message"))]
    Rejected {
        status: StatusCode,
        /// Message supplied by the server, if the body carried one
        message: Option<String>,
        body: String,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape used by the authority
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Extract the server-supplied message from a JSON error body.
    fn server_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        parsed
            .message
            .or(parsed.error)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ApiError::Rejected {
            status,
            message: Self::server_message(body),
            body: Self::truncate_body(body),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::NetworkError(e) => e.status(),
            ApiError::InvalidResponse(_) => None,
        }
    }

    /// Map a failed login call to the domain error the caller sees.
    pub fn into_login_error(self) -> SessionError {
        match self {
            ApiError::Rejected { message, .. } => SessionError::AuthRejected(
                message.unwrap_or_else(|| GENERIC_LOGIN_FAILURE.to_string()),
            ),
            ApiError::NetworkError(e) => SessionError::NetworkUnavailable(e.to_string()),
            ApiError::InvalidResponse(msg) => SessionError::InvalidResponse(msg),
        }
    }
}
