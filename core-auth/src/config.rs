//! # Engine Configuration
//!
//! Builders for the two engine flavours:
//!
//! - [`AuthCodeConfig`]: authorization code flow against a Keycloak realm
//! - [`AutomatedAuthConfig`]: test-mode login from a list of preconfigured
//!   identities
//!
//! ## Usage
//!
//! ```
//! use core_auth::config::AuthCodeConfig;
//!
//! let config = AuthCodeConfig::builder()
//!     .base_url("https://idp.example/realms/tickets")
//!     .client_id("ticket-app")
//!     .scopes(["openid", "profile"])
//!     .redirect_uri("dk.example.tickets:/oauth2redirect")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     config.token_endpoint(),
//!     "https://idp.example/realms/tickets/protocol/openid-connect/token"
//! );
//! ```

use crate::error::{AuthError, Result};
use crate::pkce::{DEFAULT_ENTROPY_BYTES, MAX_ENTROPY_BYTES, MIN_ENTROPY_BYTES};
use crate::types::{AccessTokenCallback, AuthCallback, AuthResult};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use url::Url;

const AUTH_PATH: &str = "/protocol/openid-connect/auth";
const TOKEN_PATH: &str = "/protocol/openid-connect/token";
const LOGOUT_PATH: &str = "/protocol/openid-connect/logout";

/// Settings for the authorization code engine.
#[derive(Clone)]
pub struct AuthCodeConfig {
    /// Realm URL; endpoints are derived from it.
    pub base_url: String,
    pub client_id: String,
    /// Space-separated scope list.
    pub scopes: String,
    pub redirect_uri: String,
    pub post_logout_redirect_uri: String,
    pub use_pkce: bool,
    pub pkce_entropy: usize,
    /// Log decoded token claims at `debug` level.
    pub debug: bool,
    pub on_new_access_token: Option<AccessTokenCallback>,
    pub on_auth_result: Option<AuthCallback>,
    pub on_login_result: Option<AuthCallback>,
    pub on_logout_result: Option<AuthCallback>,
}

impl AuthCodeConfig {
    pub fn builder() -> AuthCodeConfigBuilder {
        AuthCodeConfigBuilder::default()
    }

    pub fn authorization_endpoint(&self) -> String {
        format!("{}{}", self.base_url, AUTH_PATH)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}{}", self.base_url, TOKEN_PATH)
    }

    pub fn logout_endpoint(&self) -> String {
        format!("{}{}", self.base_url, LOGOUT_PATH)
    }
}

impl fmt::Debug for AuthCodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCodeConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .field("post_logout_redirect_uri", &self.post_logout_redirect_uri)
            .field("use_pkce", &self.use_pkce)
            .field("pkce_entropy", &self.pkce_entropy)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AuthCodeConfig`].
#[derive(Default)]
pub struct AuthCodeConfigBuilder {
    base_url: Option<String>,
    client_id: Option<String>,
    scopes: Vec<String>,
    redirect_uri: Option<String>,
    post_logout_redirect_uri: Option<String>,
    use_pkce: Option<bool>,
    pkce_entropy: Option<usize>,
    debug: bool,
    on_new_access_token: Option<AccessTokenCallback>,
    on_auth_result: Option<AuthCallback>,
    on_login_result: Option<AuthCallback>,
    on_logout_result: Option<AuthCallback>,
}

impl AuthCodeConfigBuilder {
    /// Realm URL, e.g. `https://idp.example/realms/tickets`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Adds one scope. Default: `openid`.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Defaults to the redirect URI.
    pub fn post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uri = Some(uri.into());
        self
    }

    /// Default: true
    pub fn use_pkce(mut self, enabled: bool) -> Self {
        self.use_pkce = Some(enabled);
        self
    }

    /// Verifier entropy in bytes, 32..=96. Default: 64
    pub fn pkce_entropy(mut self, bytes: usize) -> Self {
        self.pkce_entropy = Some(bytes);
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn on_new_access_token<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_new_access_token = Some(Arc::new(callback));
        self
    }

    /// Observer for every completed flow, refreshes included.
    pub fn on_auth_result<F>(mut self, callback: F) -> Self
    where
        F: Fn(AuthResult) + Send + Sync + 'static,
    {
        self.on_auth_result = Some(Arc::new(callback));
        self
    }

    pub fn on_login_result<F>(mut self, callback: F) -> Self
    where
        F: Fn(AuthResult) + Send + Sync + 'static,
    {
        self.on_login_result = Some(Arc::new(callback));
        self
    }

    pub fn on_logout_result<F>(mut self, callback: F) -> Self
    where
        F: Fn(AuthResult) + Send + Sync + 'static,
    {
        self.on_logout_result = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<AuthCodeConfig> {
        let base_url = required(self.base_url, "base_url")?;
        Url::parse(&base_url)
            .map_err(|e| AuthError::InvalidConfig(format!("base_url is not a URL: {}", e)))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let client_id = required(self.client_id, "client_id")?;
        let redirect_uri = required(self.redirect_uri, "redirect_uri")?;
        Url::parse(&redirect_uri)
            .map_err(|e| AuthError::InvalidConfig(format!("redirect_uri is not a URI: {}", e)))?;

        let pkce_entropy = self.pkce_entropy.unwrap_or(DEFAULT_ENTROPY_BYTES);
        if !(MIN_ENTROPY_BYTES..=MAX_ENTROPY_BYTES).contains(&pkce_entropy) {
            return Err(AuthError::InvalidPkceLength(pkce_entropy));
        }

        let scopes = if self.scopes.is_empty() {
            "openid".to_string()
        } else {
            self.scopes.join(" ")
        };

        Ok(AuthCodeConfig {
            base_url,
            client_id,
            scopes,
            post_logout_redirect_uri: self
                .post_logout_redirect_uri
                .unwrap_or_else(|| redirect_uri.clone()),
            redirect_uri,
            use_pkce: self.use_pkce.unwrap_or(true),
            pkce_entropy,
            debug: self.debug,
            on_new_access_token: self.on_new_access_token,
            on_auth_result: self.on_auth_result,
            on_login_result: self.on_login_result,
            on_logout_result: self.on_logout_result,
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AuthError::InvalidConfig(format!(
            "{} is required. Use .{}() to set it.",
            name, name
        ))),
    }
}

/// Which identity provider an automated user authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Azure,
    Dcs,
}

impl Provider {
    /// The user config key holding this provider's data.
    pub fn key(&self) -> &'static str {
        match self {
            Provider::Azure => "azure",
            Provider::Dcs => "dcs",
        }
    }
}

/// One preconfigured identity for automated login.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomatedUser {
    pub title: String,
    pub api_key: String,
    pub client_id: String,
    pub provider: Provider,
    pub nonce: String,
    pub provider_data: Map<String, Value>,
    pub authorizations: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawUser {
    title: String,
    #[serde(rename = "api-key")]
    api_key: String,
    client_id: String,
    #[serde(rename = "azureOrDcs")]
    provider: Provider,
    nonce: String,
    authorizations: Map<String, Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawUserConfig {
    url: String,
    users: Vec<RawUser>,
}

impl TryFrom<RawUser> for AutomatedUser {
    type Error = AuthError;

    fn try_from(mut raw: RawUser) -> Result<Self> {
        let key = raw.provider.key();
        let provider_data = match raw.rest.remove(key) {
            Some(Value::Object(data)) => data,
            Some(_) => {
                return Err(AuthError::UserConfig(format!(
                    "user '{}': '{}' must be an object",
                    raw.title, key
                )))
            }
            None => {
                return Err(AuthError::UserConfig(format!(
                    "user '{}': missing '{}' provider data",
                    raw.title, key
                )))
            }
        };

        Ok(AutomatedUser {
            title: raw.title,
            api_key: raw.api_key,
            client_id: raw.client_id,
            provider: raw.provider,
            nonce: raw.nonce,
            provider_data,
            authorizations: raw.authorizations,
        })
    }
}

/// Settings for the automated engine.
#[derive(Clone)]
pub struct AutomatedAuthConfig {
    /// Token issuance endpoint.
    pub token_url: String,
    pub users: Vec<AutomatedUser>,
    pub debug: bool,
    pub on_new_access_token: Option<AccessTokenCallback>,
    pub on_auth_result: Option<AuthCallback>,
}

impl AutomatedAuthConfig {
    pub fn builder() -> AutomatedAuthConfigBuilder {
        AutomatedAuthConfigBuilder::default()
    }
}

impl fmt::Debug for AutomatedAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let titles: Vec<&str> = self.users.iter().map(|u| u.title.as_str()).collect();
        f.debug_struct("AutomatedAuthConfig")
            .field("token_url", &self.token_url)
            .field("users", &titles)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

enum UserConfigSource {
    Text(String),
    Json(Value),
}

/// Builder for [`AutomatedAuthConfig`].
#[derive(Default)]
pub struct AutomatedAuthConfigBuilder {
    user_config: Option<UserConfigSource>,
    debug: bool,
    on_new_access_token: Option<AccessTokenCallback>,
    on_auth_result: Option<AuthCallback>,
}

impl AutomatedAuthConfigBuilder {
    /// User configuration as JSON text.
    pub fn user_config(mut self, json: impl Into<String>) -> Self {
        self.user_config = Some(UserConfigSource::Text(json.into()));
        self
    }

    pub fn user_config_json(mut self, json: Value) -> Self {
        self.user_config = Some(UserConfigSource::Json(json));
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn on_new_access_token<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_new_access_token = Some(Arc::new(callback));
        self
    }

    pub fn on_auth_result<F>(mut self, callback: F) -> Self
    where
        F: Fn(AuthResult) + Send + Sync + 'static,
    {
        self.on_auth_result = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<AutomatedAuthConfig> {
        let value = match self.user_config {
            Some(UserConfigSource::Text(text)) => serde_json::from_str(&text)
                .map_err(|e| AuthError::UserConfig(format!("not valid JSON: {}", e)))?,
            Some(UserConfigSource::Json(value)) => value,
            None => {
                return Err(AuthError::InvalidConfig(
                    "user_config is required. Use .user_config() to set it.".to_string(),
                ))
            }
        };

        if value.get("url").is_none() {
            return Err(AuthError::UserConfig(
                "no url found (for the token endpoint)".to_string(),
            ));
        }
        if value.get("users").is_none() {
            return Err(AuthError::UserConfig("no users array found".to_string()));
        }

        let raw: RawUserConfig =
            serde_json::from_value(value).map_err(|e| AuthError::UserConfig(e.to_string()))?;
        let users = raw
            .users
            .into_iter()
            .map(AutomatedUser::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(AutomatedAuthConfig {
            token_url: raw.url,
            users,
            debug: self.debug,
            on_new_access_token: self.on_new_access_token,
            on_auth_result: self.on_auth_result,
        })
    }
}
