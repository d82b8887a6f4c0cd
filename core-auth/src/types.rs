use bridge_traits::ProviderError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Terminal outcome of a login, logout or refresh flow.
///
/// Every caller that took part in a flow observes the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Success,
    /// The user dismissed the browser or picker.
    CancelledFlow,
    Error(ErrorCause),
}

impl AuthResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthResult::Success)
    }
}

impl fmt::Display for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthResult::Success => write!(f, "success"),
            AuthResult::CancelledFlow => write!(f, "cancelled"),
            AuthResult::Error(cause) => write!(f, "error: {}", cause),
        }
    }
}

/// Why a flow ended in [`AuthResult::Error`].
///
/// Underlying errors are carried as rendered messages so results stay
/// cloneable across any number of waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCause {
    /// Token exchange or issuance failed (network, HTTP status, bad body).
    GetToken(String),
    /// The identity provider redirected back with an OAuth error.
    AuthorizationFlow(ProviderError),
    /// The redirect carried neither a code nor a usable error.
    ParseRedirectUri { error: String, description: String },
    /// The browser surface returned something that could not be classified.
    UnknownAuthIntentResult(String),
    /// Logout needs an ID token and none is stored.
    MissingIdToken,
    /// The logout redirect did not match the configured redirect URI.
    UnknownRedirectUri { expected: String, actual: String },
    /// The browser or picker could not be launched.
    LaunchIntent(String),
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCause::GetToken(e) => write!(f, "failed to get token: {}", e),
            ErrorCause::AuthorizationFlow(e) => write!(f, "authorization flow failed: {}", e),
            ErrorCause::ParseRedirectUri { error, description } => {
                write!(f, "could not parse redirect uri: {} {}", error, description)
            }
            ErrorCause::UnknownAuthIntentResult(detail) => {
                write!(f, "unknown browser result: {}", detail)
            }
            ErrorCause::MissingIdToken => write!(f, "no id token available for logout"),
            ErrorCause::UnknownRedirectUri { expected, actual } => {
                write!(f, "unexpected redirect uri {} (expected {})", actual, expected)
            }
            ErrorCause::LaunchIntent(e) => write!(f, "could not launch flow: {}", e),
        }
    }
}

/// Callback receiving the outcome of a flow.
pub type AuthCallback = Arc<dyn Fn(AuthResult) + Send + Sync>;

/// Callback receiving every newly issued access token.
pub type AccessTokenCallback = Arc<dyn Fn(String) + Send + Sync>;

/// The credential set held by the token store.
///
/// Expiries are always derived from the tokens' own `exp` claims.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expiry: Option<DateTime<Utc>>,
    pub refresh_token_expiry: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.id_token.is_none()
    }
}

// Token values never reach logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &Option<String>| token.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Session")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("id_token", &redact(&self.id_token))
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .finish()
    }
}

/// One pending caller's ticket in the coordinator's registry.
pub struct AuthJob {
    pub id: u64,
    /// Set once, when the flow the job is waiting on completes.
    pub result: Option<AuthResult>,
    pub callback: Option<AuthCallback>,
    /// Fire-and-forget jobs (login/logout) are dropped as soon as their
    /// callback has been scheduled.
    pub no_return: bool,
}

impl AuthJob {
    pub fn new(id: u64, no_return: bool, callback: Option<AuthCallback>) -> Self {
        Self {
            id,
            result: None,
            callback,
            no_return,
        }
    }
}

impl fmt::Debug for AuthJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthJob")
            .field("id", &self.id)
            .field("result", &self.result)
            .field("has_callback", &self.callback.is_some())
            .field("no_return", &self.no_return)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_debug_redacts_tokens() {
        let session = Session {
            access_token: Some("eyJ.secret.access".to_string()),
            refresh_token: Some("eyJ.secret.refresh".to_string()),
            id_token: None,
            access_token_expiry: None,
            refresh_token_expiry: None,
        };

        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("id_token: None"));
    }

    #[test]
    fn test_empty_session() {
        assert!(Session::default().is_empty());
        let session = Session {
            id_token: Some("id".to_string()),
            ..Session::default()
        };
        assert!(!session.is_empty());
    }

    #[test]
    fn test_error_cause_display() {
        let cause = ErrorCause::UnknownRedirectUri {
            expected: "app://callback".to_string(),
            actual: "evil://callback".to_string(),
        };
        assert_eq!(
            AuthResult::Error(cause).to_string(),
            "error: unexpected redirect uri evil://callback (expected app://callback)"
        );
        assert_eq!(AuthResult::CancelledFlow.to_string(), "cancelled");
    }
}
