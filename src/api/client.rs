//! Client for the remote authentication authority.
//!
//! This module provides the `SessionClient` struct for the three calls the
//! session lifecycle needs: login, logout and session verification.

use std::fmt;

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{SessionError, SessionResult};

use super::ApiError;

/// Credentials sent to the login endpoint.
#[derive(Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: String,
    /// Only checked by the authority for privileged roles
    pub admin_password: Option<String>,
    pub remember_me: bool,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            role: role.into(),
            ..Default::default()
        }
    }

    pub fn remember_me(mut self, remember: bool) -> Self {
        self.remember_me = remember;
        self
    }

    pub fn admin_password(mut self, password: impl Into<String>) -> Self {
        self.admin_password = Some(password.into());
        self
    }
}

// Passwords stay out of logs
impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("role", &self.role)
            .field("remember_me", &self.remember_me)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Endpoint paths on the authority; they vary between deployments.
#[derive(Debug, Clone)]
struct Endpoints {
    login: String,
    logout: String,
    verify: String,
}

/// Client for the remote authority.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SessionClient {
    client: Client,
    base_url: String,
    endpoints: Endpoints,
}

impl SessionClient {
    /// Create a client for `config.api_base_url` using the configured paths.
    pub fn new(config: &Config) -> SessionResult<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.origin().to_string(),
            endpoints: Endpoints {
                login: config.login_path.clone(),
                logout: config.logout_path.clone(),
                verify: config.verify_path.clone(),
            },
        })
    }

    /// Create a client with default paths against `base_url`.
    pub fn with_base_url(base_url: &str) -> SessionResult<Self> {
        let config = Config {
            api_base_url: base_url.to_string(),
            ..Config::default()
        };
        Self::new(&config)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn send_login(&self, request: &LoginRequest) -> Result<String, ApiError> {
        let url = self.url(&self.endpoints.login);

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;

        let response = Self::check_response(response).await?;

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("login response is not JSON: {}", e)))?;

        body.token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("login response has no token".to_string()))
    }

    /// Exchange credentials for a raw bearer token.
    ///
    /// The token is returned undecoded and unstored; the caller owns both steps.
    pub async fn login(&self, request: &LoginRequest) -> SessionResult<String> {
        debug!(email = %request.email, role = %request.role, "Sending login request");
        self.send_login(request).await.map_err(|e| {
            warn!(error = %e, "Login request failed");
            e.into_login_error()
        })
    }

    /// Tell the authority the session is over.
    ///
    /// Callers treat a failure as advisory: local teardown happens regardless.
    pub async fn logout(&self, token: Option<&str>) -> SessionResult<()> {
        let url = self.url(&self.endpoints.logout);

        let mut request = self.client.post(&url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SessionError::RemoteLogoutFailed(e.to_string()))?;

        Self::check_response(response)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::RemoteLogoutFailed(e.to_string()))
    }

    /// Ask the authority whether `token` is still accepted.
    ///
    /// Only an explicit 2xx counts as valid; every failure reads as `false`.
    pub async fn verify_session(&self, token: &str) -> bool {
        let url = self.url(&self.endpoints.verify);

        match self.client.get(&url).bearer_auth(token).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = %response.status(), "Session verification rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Session verification request failed");
                false
            }
        }
    }
}
