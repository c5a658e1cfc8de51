//! Bearer token decoding.
//!
//! Tokens are JWTs in compact form (`header.payload.signature`). Only the
//! payload is read, and the signature is never checked: the decoded claims are
//! for showing who is signed in and for local expiry checks. Anything that
//! grants access must be re-validated by the remote authority.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SessionError, SessionResult};

/// Identity claims carried in a token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    /// Expiry instant in milliseconds since the Unix epoch. Fractional `exp`
    /// seconds keep their sub-second part.
    pub exp_ms: i64,
}

/// Payload as it appears on the wire, before validation.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    sub: Option<Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    exp: Option<Value>,
}

impl Claims {
    /// Expiry in whole seconds, as carried in the `exp` claim.
    pub fn exp(&self) -> i64 {
        self.exp_ms.div_euclid(1000)
    }

    /// Expiry as a timestamp, if it is representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.exp_ms)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        match self.expires_at() {
            Some(expiry) => expiry - now,
            None => Duration::zero(),
        }
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes().max(0)
    }
}

/// Decode the payload of `token` into [`Claims`].
pub fn decode(token: &str) -> SessionResult<Claims> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(malformed(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let payload = segments[1].trim_end_matches('=');
    if payload.is_empty() {
        return Err(malformed("empty payload"));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| malformed(format!("payload is not base64url: {}", e)))?;

    let raw: RawClaims = serde_json::from_slice(&bytes)
        .map_err(|e| malformed(format!("payload is not a claims object: {}", e)))?;

    let user_id = raw
        .user_id
        .or(raw.sub)
        .and_then(subject_to_string)
        .ok_or_else(|| malformed("missing subject"))?;

    let exp_ms = match raw.exp {
        Some(value) => expiry_millis(&value)
            .ok_or_else(|| malformed(format!("non-numeric expiry: {}", value)))?,
        None => return Err(malformed("missing expiry")),
    };

    Ok(Claims {
        user_id,
        email: raw.email,
        role: raw.role,
        exp_ms,
    })
}

/// True when the expiry lies strictly before `now`, compared in milliseconds.
pub fn is_expired(claims: &Claims, now: DateTime<Utc>) -> bool {
    claims.exp_ms < now.timestamp_millis()
}

fn malformed(reason: impl Into<String>) -> SessionError {
    SessionError::MalformedToken(reason.into())
}

fn subject_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn expiry_millis(value: &Value) -> Option<i64> {
    if let Some(secs) = value.as_i64() {
        return Some(secs.saturating_mul(1000));
    }
    // Some issuers emit fractional seconds. Flooring is exact against an
    // integral `now` in milliseconds; the cast saturates.
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| (f * 1000.0).floor() as i64)
}
