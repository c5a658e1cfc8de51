//! The read-only view handed to the UI layer.

use serde::Serialize;

use crate::auth::Claims;

use super::state::{AuthStatus, SessionState};

/// Identity shown by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct SessionUser {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl From<&Claims> for SessionUser {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.user_id.clone(),
            email: claims.email.clone(),
            role: claims.role.clone(),
        }
    }
}

/// What the UI may read about the session.
///
/// Until startup has finished, only `loading_auth = true` is visible; the
/// resolved status is withheld so the UI never renders a partial state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AuthContext {
    pub authenticated: bool,
    pub user: Option<SessionUser>,
    pub loading_auth: bool,
}

impl From<&SessionState> for AuthContext {
    fn from(state: &SessionState) -> Self {
        if !state.is_ready() {
            return Self {
                authenticated: false,
                user: None,
                loading_auth: true,
            };
        }
        Self {
            authenticated: state.status() == AuthStatus::Authenticated,
            user: state.identity().map(SessionUser::from),
            loading_auth: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::SessionMachine;

    fn claims() -> Claims {
        Claims {
            user_id: "7".to_string(),
            email: Some("ana@example.com".to_string()),
            role: Some("admin".to_string()),
            exp_ms: i64::MAX,
        }
    }

    #[test]
    fn test_context_hidden_until_ready() {
        let machine = SessionMachine::new();
        machine.resolve_startup(Some(claims()));

        let ctx = AuthContext::from(&machine.snapshot());
        assert!(ctx.loading_auth);
        assert!(!ctx.authenticated);
        assert!(ctx.user.is_none());

        machine.mark_ready();
        let ctx = AuthContext::from(&machine.snapshot());
        assert!(!ctx.loading_auth);
        assert!(ctx.authenticated);
        assert_eq!(ctx.user.unwrap().id, "7");
    }

    #[test]
    fn test_context_serializes_camel_case() {
        let ctx = AuthContext {
            authenticated: true,
            user: Some(SessionUser::from(&claims())),
            loading_auth: false,
        };
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["loadingAuth"], false);
        assert_eq!(value["user"]["email"], "ana@example.com");
    }
}
