//! Automated (test-mode) login.
//!
//! The browser step is replaced by a host [`UserPicker`] listing the
//! preconfigured users; the selected user's credentials are posted to a token
//! issuance endpoint. Only an access token is issued, so there is no refresh
//! and logout is a local clear.

use crate::config::{AutomatedAuthConfig, AutomatedUser, Provider};
use crate::engine::Engine;
use crate::error::Result;
use crate::token_store::TokenStore;
use crate::transport::TokenTransport;
use crate::types::{AuthResult, ErrorCause};
use async_trait::async_trait;
use bridge_traits::ui::{InlineDispatcher, PickOutcome, UiDispatcher, UserPicker};
use core_runtime::config::CoreConfig;
use core_runtime::logging::redact_if_sensitive;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct AutomatedEngine {
    config: AutomatedAuthConfig,
    store: Arc<TokenStore>,
    transport: TokenTransport,
    picker: Arc<dyn UserPicker>,
    dispatcher: Arc<dyn UiDispatcher>,
}

impl AutomatedEngine {
    pub fn new(
        config: AutomatedAuthConfig,
        store: Arc<TokenStore>,
        transport: TokenTransport,
        picker: Arc<dyn UserPicker>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            picker,
            dispatcher: Arc::new(InlineDispatcher),
        }
    }

    /// Context on which `on_new_access_token` runs. Defaults to the calling
    /// task.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn UiDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Wire the engine from host bridges. Requires an HTTP client and a user
    /// picker.
    pub fn from_core(core: &CoreConfig, config: AutomatedAuthConfig) -> Result<Self> {
        let store = TokenStore::new(core.secure_store.clone(), core.clock.clone())
            .with_claim_logging(config.debug);
        let transport = TokenTransport::new(core.require_http_client()?);
        let picker = core.require_user_picker()?;

        Ok(Self::new(config, Arc::new(store), transport, picker)
            .with_dispatcher(core.ui_dispatcher.clone()))
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    #[instrument(skip(self, user), fields(user = %user.title, provider = user.provider.key()))]
    async fn issue_token(&self, user: &AutomatedUser) -> AuthResult {
        let request = token_request(user);
        if self.config.debug {
            debug!(body = %redacted(&request), "Token request");
        }

        let body = match self.transport.post_json(&self.config.token_url, &request).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Token issuance failed");
                return AuthResult::Error(ErrorCause::GetToken(e.to_string()));
            }
        };

        let access_token = match body.get("access_token").and_then(Value::as_str) {
            Some(token) => token,
            None => {
                warn!("Token issuance response is missing access_token");
                return AuthResult::Error(ErrorCause::GetToken(
                    "token response is missing access_token".to_string(),
                ));
            }
        };

        if let Err(e) = self.store.update(access_token, None, None).await {
            warn!(error = %e, "Failed to store issued token");
            return AuthResult::Error(ErrorCause::GetToken(e.to_string()));
        }

        info!("Automated login completed");
        if let Some(callback) = &self.config.on_new_access_token {
            let callback = Arc::clone(callback);
            let token = access_token.to_string();
            self.dispatcher.dispatch(Box::new(move || callback(token)));
        }
        AuthResult::Success
    }
}

/// Request body for the token issuance endpoint.
///
/// Azure users carry their provider data nested under `azure`; DCS users
/// have it merged into the top level.
pub fn token_request(user: &AutomatedUser) -> Value {
    let mut body = Map::new();
    body.insert("api-key".to_string(), Value::String(user.api_key.clone()));
    body.insert("client_id".to_string(), Value::String(user.client_id.clone()));
    body.insert(
        "azureOrDcs".to_string(),
        Value::String(user.provider.key().to_string()),
    );
    body.insert("nonce".to_string(), Value::String(user.nonce.clone()));

    match user.provider {
        Provider::Azure => {
            body.insert(
                Provider::Azure.key().to_string(),
                Value::Object(user.provider_data.clone()),
            );
        }
        Provider::Dcs => {
            for (key, value) in &user.provider_data {
                body.insert(key.clone(), value.clone());
            }
        }
    }
    body.insert(
        "authorizations".to_string(),
        Value::Object(user.authorizations.clone()),
    );

    Value::Object(body)
}

fn redacted(body: &Value) -> Value {
    match body {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(text) => Value::String(redact_if_sensitive(key, text)),
                        other => other.clone(),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

#[async_trait]
impl Engine for AutomatedEngine {
    #[instrument(skip(self), fields(users = self.config.users.len()))]
    async fn login(&self) -> AuthResult {
        let titles = self.config.users.iter().map(|u| u.title.clone()).collect();

        info!("Launching user picker");
        match self.picker.pick(titles).await {
            Err(e) => {
                warn!(error = %e, "Cannot launch user picker");
                AuthResult::Error(ErrorCause::LaunchIntent(e.to_string()))
            }
            Ok(PickOutcome::Cancelled) => {
                info!("User picker was cancelled by user");
                AuthResult::CancelledFlow
            }
            Ok(PickOutcome::Selected(index)) => match self.config.users.get(index) {
                Some(user) => self.issue_token(user).await,
                None => {
                    warn!(index, "User picker returned an unknown index");
                    AuthResult::Error(ErrorCause::UnknownAuthIntentResult(format!(
                        "no user at index {}",
                        index
                    )))
                }
            },
        }
    }

    async fn logout(&self) -> AuthResult {
        info!("Logout is local for automated login, clearing session");
        self.clear().await;
        AuthResult::Success
    }

    async fn refresh(&self) -> bool {
        debug!("Refresh is not supported for automated login");
        false
    }

    async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to delete persisted tokens");
        }
    }

    fn needs_refresh(&self) -> bool {
        self.store.needs_refresh()
    }

    fn is_authorized(&self) -> bool {
        !self.store.needs_refresh()
    }

    fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    fn roles(&self) -> Vec<String> {
        self.store.roles()
    }

    fn access_token_expiry(&self) -> Option<i64> {
        self.store.access_token_expiry().map(|expiry| expiry.timestamp())
    }

    fn dispose(&self) {
        self.store.clear_in_memory();
    }
}
