//! # Authorization Code Engine
//!
//! OAuth 2.0 authorization code flow (with optional PKCE) against a Keycloak
//! realm.
//!
//! ## Flows
//!
//! - **Login**: build the authorization URL, present it through the host's
//!   [`BrowserSurface`], parse the redirect, exchange the code at the token
//!   endpoint and store the returned access, refresh and ID tokens.
//! - **Refresh**: `grant_type=refresh_token` against the token endpoint.
//!   Skipped without a network call when no refresh token is valid.
//! - **Logout**: present the end-session URL with `id_token_hint`; the
//!   session is cleared once the provider redirects back to the configured
//!   post-logout URI.
//!
//! Every failure is reported as an [`AuthResult`]; nothing here returns an
//! error to the coordinator.

use crate::config::AuthCodeConfig;
use crate::engine::Engine;
use crate::error::{Result, TransportError};
use crate::pkce::{self, PkceVerifier, CHALLENGE_METHOD};
use crate::redirect::{self, ParsedRedirect};
use crate::token_store::TokenStore;
use crate::transport::TokenTransport;
use crate::types::{AuthResult, ErrorCause};
use async_trait::async_trait;
use bridge_traits::ui::{BrowserFlow, BrowserOutcome, BrowserSurface, InlineDispatcher, UiDispatcher};
use core_runtime::config::CoreConfig;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// An authorization request ready to be presented.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
    /// Present when PKCE is enabled; consumed by the code exchange.
    pub verifier: Option<PkceVerifier>,
}

/// Tokens returned by a successful code exchange.
struct IssuedTokens {
    access_token: String,
    refresh_token: String,
    id_token: String,
}

impl IssuedTokens {
    fn from_response(body: &Value) -> std::result::Result<Self, String> {
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| format!("token response is missing {}", name))
        };

        Ok(Self {
            access_token: field("access_token")?,
            refresh_token: field("refresh_token")?,
            id_token: field("id_token")?,
        })
    }
}

pub struct AuthCodeEngine {
    config: AuthCodeConfig,
    store: Arc<TokenStore>,
    transport: TokenTransport,
    browser: Arc<dyn BrowserSurface>,
    dispatcher: Arc<dyn UiDispatcher>,
}

impl AuthCodeEngine {
    pub fn new(
        config: AuthCodeConfig,
        store: Arc<TokenStore>,
        transport: TokenTransport,
        browser: Arc<dyn BrowserSurface>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            browser,
            dispatcher: Arc::new(InlineDispatcher),
        }
    }

    /// Context on which `on_new_access_token` runs. Defaults to the calling
    /// task.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn UiDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Wire the engine from host bridges.
    ///
    /// Fails when the HTTP client or browser surface is missing.
    pub fn from_core(core: &CoreConfig, config: AuthCodeConfig) -> Result<Self> {
        let store = TokenStore::new(core.secure_store.clone(), core.clock.clone())
            .with_claim_logging(config.debug);
        let transport = TokenTransport::new(core.require_http_client()?);
        let browser = core.require_browser()?;

        Ok(Self::new(config, Arc::new(store), transport, browser)
            .with_dispatcher(core.ui_dispatcher.clone()))
    }

    pub fn config(&self) -> &AuthCodeConfig {
        &self.config
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Build the authorization URL with a fresh `state`, `nonce` and, when
    /// enabled, PKCE verifier.
    pub fn authorization_request(&self) -> Result<AuthorizationRequest> {
        let state = pkce::random_token();
        let nonce = pkce::random_token();
        let verifier = if self.config.use_pkce {
            Some(PkceVerifier::generate(self.config.pkce_entropy)?)
        } else {
            None
        };

        let mut url = parse_endpoint(&self.config.authorization_endpoint())?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("scope", &self.config.scopes)
                .append_pair("state", &state)
                .append_pair("nonce", &nonce);
            if let Some(verifier) = &verifier {
                query
                    .append_pair("code_challenge", &verifier.challenge())
                    .append_pair("code_challenge_method", CHALLENGE_METHOD);
            }
        }

        Ok(AuthorizationRequest {
            url: url.into(),
            state,
            nonce,
            verifier,
        })
    }

    /// Build the end-session URL for `id_token`.
    pub fn logout_url(&self, id_token: &str) -> Result<String> {
        let mut url = parse_endpoint(&self.config.logout_endpoint())?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("id_token_hint", id_token)
            .append_pair(
                "post_logout_redirect_uri",
                &self.config.post_logout_redirect_uri,
            )
            .append_pair("state", &pkce::random_token());
        Ok(url.into())
    }

    #[instrument(skip(self, code, verifier), fields(client_id = %self.config.client_id, pkce = verifier.is_some()))]
    async fn exchange_code(&self, code: &str, verifier: Option<&PkceVerifier>) -> AuthResult {
        let token_endpoint = self.config.token_endpoint();
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if let Some(verifier) = verifier {
            params.push(("code_verifier", verifier.verifier()));
        }

        debug!("Exchanging authorization code for tokens");

        let body = match self.transport.post_form(&token_endpoint, &params).await {
            Ok(body) => body,
            Err(e) => return get_token_error(e),
        };

        let tokens = match IssuedTokens::from_response(&body) {
            Ok(tokens) => tokens,
            Err(message) => {
                warn!(error = %message, "Token exchange returned an incomplete response");
                return AuthResult::Error(ErrorCause::GetToken(message));
            }
        };

        if let Err(e) = self
            .store
            .update(
                &tokens.access_token,
                Some(&tokens.refresh_token),
                Some(&tokens.id_token),
            )
            .await
        {
            warn!(error = %e, "Failed to store exchanged tokens");
            return AuthResult::Error(ErrorCause::GetToken(e.to_string()));
        }

        info!("Authorization code exchanged");
        self.notify_new_access_token();
        AuthResult::Success
    }

    fn notify_new_access_token(&self) {
        if let (Some(callback), Some(token)) =
            (&self.config.on_new_access_token, self.store.access_token())
        {
            let callback = Arc::clone(callback);
            self.dispatcher.dispatch(Box::new(move || callback(token)));
        }
    }

    async fn complete_authorization(&self, request: AuthorizationRequest, uri: &str) -> AuthResult {
        match redirect::parse(uri) {
            ParsedRedirect::Success { code, state } => {
                if state != request.state {
                    warn!("Authorization redirect carried an unexpected state");
                    return AuthResult::Error(ErrorCause::ParseRedirectUri {
                        error: "state_mismatch".to_string(),
                        description: "redirect state does not match the request".to_string(),
                    });
                }
                self.exchange_code(&code, request.verifier.as_ref()).await
            }
            ParsedRedirect::Error { error, description } => {
                warn!(error = %error, description = %description, "Authorization redirect carried an error");
                AuthResult::Error(ErrorCause::ParseRedirectUri { error, description })
            }
        }
    }
}

#[async_trait]
impl Engine for AuthCodeEngine {
    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    async fn login(&self) -> AuthResult {
        let request = match self.authorization_request() {
            Ok(request) => request,
            Err(e) => return AuthResult::Error(ErrorCause::LaunchIntent(e.to_string())),
        };

        info!("Launching authorization flow");
        let outcome = self
            .browser
            .launch(BrowserFlow::Authorization, request.url.clone())
            .await;

        match outcome {
            Err(e) => {
                warn!(error = %e, "Cannot launch authorization flow");
                AuthResult::Error(ErrorCause::LaunchIntent(e.to_string()))
            }
            Ok(BrowserOutcome::UserCancelled) => {
                info!("Authorization flow was cancelled by user");
                AuthResult::CancelledFlow
            }
            Ok(BrowserOutcome::ProviderError(error)) => {
                warn!(error = %error, "Identity provider reported an error");
                AuthResult::Error(ErrorCause::AuthorizationFlow(error))
            }
            Ok(BrowserOutcome::Unrecognized(detail)) => {
                warn!(detail = %detail, "Browser returned an unrecognized result");
                AuthResult::Error(ErrorCause::UnknownAuthIntentResult(detail))
            }
            Ok(BrowserOutcome::Success(uri)) => self.complete_authorization(request, &uri).await,
        }
    }

    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    async fn logout(&self) -> AuthResult {
        let id_token = match self.store.id_token() {
            Some(token) => token,
            None => {
                warn!("Cannot launch logout flow without an id token");
                return AuthResult::Error(ErrorCause::MissingIdToken);
            }
        };

        let url = match self.logout_url(&id_token) {
            Ok(url) => url,
            Err(e) => return AuthResult::Error(ErrorCause::LaunchIntent(e.to_string())),
        };

        info!("Launching logout flow");
        match self.browser.launch(BrowserFlow::Logout, url).await {
            Err(e) => {
                warn!(error = %e, "Cannot launch logout flow");
                AuthResult::Error(ErrorCause::LaunchIntent(e.to_string()))
            }
            Ok(BrowserOutcome::UserCancelled) => AuthResult::CancelledFlow,
            Ok(BrowserOutcome::ProviderError(error)) => {
                warn!(error = %error, "Logout failed at the identity provider");
                AuthResult::Error(ErrorCause::AuthorizationFlow(error))
            }
            Ok(BrowserOutcome::Unrecognized(detail)) => {
                AuthResult::Error(ErrorCause::UnknownAuthIntentResult(detail))
            }
            Ok(BrowserOutcome::Success(uri)) => {
                let expected = &self.config.post_logout_redirect_uri;
                if !uri.starts_with(expected.as_str()) {
                    warn!(expected = %expected, actual = %uri, "Logout redirected to an unknown uri");
                    return AuthResult::Error(ErrorCause::UnknownRedirectUri {
                        expected: expected.clone(),
                        actual: uri,
                    });
                }
                self.clear().await;
                info!("Completed logout");
                AuthResult::Success
            }
        }
    }

    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    async fn refresh(&self) -> bool {
        let refresh_token = match self.store.refresh_token() {
            Some(token) if self.store.is_authorized() => token,
            _ => {
                debug!("No valid refresh token, skipping refresh");
                return false;
            }
        };

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("scope", self.config.scopes.as_str()),
        ];

        let body = match self
            .transport
            .post_form(&self.config.token_endpoint(), &params)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return false;
            }
        };

        let access_token = match body.get("access_token").and_then(Value::as_str) {
            Some(token) => token,
            None => {
                warn!("Token refresh response is missing access_token");
                return false;
            }
        };
        let refresh_token = body.get("refresh_token").and_then(Value::as_str);
        let id_token = body.get("id_token").and_then(Value::as_str);

        if let Err(e) = self
            .store
            .update(access_token, refresh_token, id_token)
            .await
        {
            warn!(error = %e, "Failed to store refreshed tokens");
            return false;
        }

        info!("Access token refreshed");
        self.notify_new_access_token();
        true
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
        self.store.is_authorized()
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

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    Url::parse(endpoint).map_err(|e| {
        crate::error::AuthError::InvalidConfig(format!("invalid endpoint {}: {}", endpoint, e))
    })
}

fn get_token_error(error: TransportError) -> AuthResult {
    warn!(error = %error, "Token exchange failed");
    AuthResult::Error(ErrorCause::GetToken(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::test_tokens::jwt_expiring_at;
    use crate::test_support::{FixedClock, MemorySecureStore, NOW};
    use crate::token_store::{ACCESS_TOKEN_KEY, ID_TOKEN_KEY};
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bridge_traits::ui::UiTask;
    use bridge_traits::ProviderError;
    use bytes::Bytes;
    use mockall::mock;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    /// Browser that answers with a canned outcome built from the launched URL.
    struct ScriptedBrowser {
        respond: Box<dyn Fn(&Url) -> BridgeResult<BrowserOutcome> + Send + Sync>,
        launched: Mutex<Vec<(BrowserFlow, String)>>,
    }

    impl ScriptedBrowser {
        fn new<F>(respond: F) -> Arc<Self>
        where
            F: Fn(&Url) -> BridgeResult<BrowserOutcome> + Send + Sync + 'static,
        {
            Arc::new(Self {
                respond: Box::new(respond),
                launched: Mutex::new(Vec::new()),
            })
        }

        fn launches(&self) -> Vec<(BrowserFlow, String)> {
            self.launched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrowserSurface for ScriptedBrowser {
        async fn launch(&self, flow: BrowserFlow, url: String) -> BridgeResult<BrowserOutcome> {
            self.launched.lock().unwrap().push((flow, url.clone()));
            (self.respond)(&Url::parse(&url).unwrap())
        }
    }

    fn query_param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    fn redirect_with_code(url: &Url) -> BridgeResult<BrowserOutcome> {
        let state = query_param(url, "state").unwrap();
        Ok(BrowserOutcome::Success(format!(
            "dk.example.tickets:/oauth2redirect?state={}&code=auth-code-1",
            state
        )))
    }

    fn json_response(status: u16, body: Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn token_response() -> Value {
        json!({
            "access_token": jwt_expiring_at(NOW + 300, &["inspector"]),
            "refresh_token": jwt_expiring_at(NOW + 1800, &[]),
            "id_token": "id-token-1",
            "expires_in": 300
        })
    }

    fn config(use_pkce: bool) -> AuthCodeConfig {
        AuthCodeConfig::builder()
            .base_url("https://idp.example/realms/tickets")
            .client_id("ticket-app")
            .scopes(["openid", "profile"])
            .redirect_uri("dk.example.tickets:/oauth2redirect")
            .use_pkce(use_pkce)
            .build()
            .unwrap()
    }

    fn engine(
        config: AuthCodeConfig,
        http: MockHttpClient,
        browser: Arc<ScriptedBrowser>,
        secure_store: &MemorySecureStore,
    ) -> AuthCodeEngine {
        let store = TokenStore::new(Arc::new(secure_store.clone()), FixedClock::new());
        AuthCodeEngine::new(
            config,
            Arc::new(store),
            TokenTransport::new(Arc::new(http)),
            browser,
        )
    }

    fn form_body(request: &HttpRequest) -> HashMap<String, String> {
        let body = request.body.clone().unwrap_or_default();
        serde_urlencoded::from_bytes(&body).unwrap()
    }

    #[test]
    fn test_authorization_request_parameters() {
        let engine = engine(
            config(true),
            MockHttpClient::new(),
            ScriptedBrowser::new(|_| Ok(BrowserOutcome::UserCancelled)),
            &MemorySecureStore::default(),
        );

        let request = engine.authorization_request().unwrap();
        let url = Url::parse(&request.url).unwrap();

        assert_eq!(
            url.path(),
            "/realms/tickets/protocol/openid-connect/auth"
        );
        assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_param(&url, "client_id").as_deref(), Some("ticket-app"));
        assert_eq!(query_param(&url, "scope").as_deref(), Some("openid profile"));
        assert_eq!(query_param(&url, "state"), Some(request.state.clone()));
        assert_eq!(query_param(&url, "nonce"), Some(request.nonce.clone()));
        assert_eq!(
            query_param(&url, "code_challenge"),
            request.verifier.as_ref().map(|v| v.challenge())
        );
        assert_eq!(
            query_param(&url, "code_challenge_method").as_deref(),
            Some("S256")
        );
    }

    #[test]
    fn test_authorization_request_without_pkce() {
        let engine = engine(
            config(false),
            MockHttpClient::new(),
            ScriptedBrowser::new(|_| Ok(BrowserOutcome::UserCancelled)),
            &MemorySecureStore::default(),
        );

        let request = engine.authorization_request().unwrap();
        let url = Url::parse(&request.url).unwrap();

        assert!(request.verifier.is_none());
        assert!(query_param(&url, "code_challenge").is_none());
        assert!(query_param(&url, "code_challenge_method").is_none());
    }

    #[tokio::test]
    async fn test_login_exchanges_code_and_stores_tokens() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .withf(|request| {
                let form = form_body(request);
                request.url == "https://idp.example/realms/tickets/protocol/openid-connect/token"
                    && form.get("grant_type").map(String::as_str) == Some("authorization_code")
                    && form.get("code").map(String::as_str) == Some("auth-code-1")
                    && form.get("client_id").map(String::as_str) == Some("ticket-app")
                    && form.get("redirect_uri").map(String::as_str)
                        == Some("dk.example.tickets:/oauth2redirect")
                    && form.contains_key("code_verifier")
            })
            .returning(|_| Ok(json_response(200, token_response())));

        let secure_store = MemorySecureStore::default();
        let browser = ScriptedBrowser::new(redirect_with_code);
        let issued = Arc::new(Mutex::new(Vec::new()));
        let sink = issued.clone();
        let mut config = config(true);
        config.on_new_access_token = Some(Arc::new(move |token| sink.lock().unwrap().push(token)));

        let engine = engine(config, http, browser.clone(), &secure_store);
        let result = engine.login().await;

        assert_eq!(result, AuthResult::Success);
        assert_eq!(engine.roles(), vec!["inspector"]);
        assert!(!engine.needs_refresh());
        assert!(engine.is_authorized());
        assert_eq!(secure_store.get(ID_TOKEN_KEY).await.as_deref(), Some("id-token-1"));
        assert_eq!(issued.lock().unwrap().len(), 1);
        assert_eq!(browser.launches()[0].0, BrowserFlow::Authorization);
    }

    /// Holds dispatched tasks until the test drains them.
    #[derive(Default)]
    struct QueuedDispatcher {
        tasks: Mutex<Vec<UiTask>>,
    }

    impl QueuedDispatcher {
        fn run_pending(&self) -> usize {
            let tasks: Vec<UiTask> = self.tasks.lock().unwrap().drain(..).collect();
            let count = tasks.len();
            for task in tasks {
                task();
            }
            count
        }
    }

    impl UiDispatcher for QueuedDispatcher {
        fn dispatch(&self, task: UiTask) {
            self.tasks.lock().unwrap().push(task);
        }
    }

    #[tokio::test]
    async fn test_new_access_token_is_delivered_through_dispatcher() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(200, token_response())));

        let secure_store = MemorySecureStore::default();
        let browser = ScriptedBrowser::new(redirect_with_code);
        let issued = Arc::new(Mutex::new(Vec::new()));
        let sink = issued.clone();
        let mut config = config(true);
        config.on_new_access_token = Some(Arc::new(move |token| sink.lock().unwrap().push(token)));

        let dispatcher = Arc::new(QueuedDispatcher::default());
        let engine =
            engine(config, http, browser, &secure_store).with_dispatcher(dispatcher.clone());

        assert_eq!(engine.login().await, AuthResult::Success);
        assert!(issued.lock().unwrap().is_empty());

        assert_eq!(dispatcher.run_pending(), 1);
        assert_eq!(issued.lock().unwrap().clone(), vec![engine.access_token().unwrap()]);
    }

    #[tokio::test]
    async fn test_login_outcomes_without_exchange() {
        let cases: Vec<(BridgeResult<BrowserOutcome>, AuthResult)> = vec![
            (Ok(BrowserOutcome::UserCancelled), AuthResult::CancelledFlow),
            (
                Ok(BrowserOutcome::ProviderError(ProviderError::new(
                    "access_denied",
                    "User denied",
                ))),
                AuthResult::Error(ErrorCause::AuthorizationFlow(ProviderError::new(
                    "access_denied",
                    "User denied",
                ))),
            ),
            (
                Ok(BrowserOutcome::Unrecognized("result code 7".to_string())),
                AuthResult::Error(ErrorCause::UnknownAuthIntentResult(
                    "result code 7".to_string(),
                )),
            ),
            (
                Err(BridgeError::NotAvailable("no browser".to_string())),
                AuthResult::Error(ErrorCause::LaunchIntent(
                    "Not available: no browser".to_string(),
                )),
            ),
            (
                Ok(BrowserOutcome::Success(
                    "dk.example.tickets:/oauth2redirect#error=invalid_request&error_description=Invalid+state".to_string(),
                )),
                AuthResult::Error(ErrorCause::ParseRedirectUri {
                    error: "invalid_request".to_string(),
                    description: "Invalid state".to_string(),
                }),
            ),
        ];

        for (outcome, expected) in cases {
            let outcome = Mutex::new(Some(outcome));
            let browser = ScriptedBrowser::new(move |_| outcome.lock().unwrap().take().unwrap());
            let mut http = MockHttpClient::new();
            http.expect_execute().times(0);

            let engine = engine(config(true), http, browser, &MemorySecureStore::default());
            let result = engine.login().await;

            match (&result, &expected) {
                (
                    AuthResult::Error(ErrorCause::LaunchIntent(_)),
                    AuthResult::Error(ErrorCause::LaunchIntent(_)),
                ) => {}
                _ => assert_eq!(result, expected),
            }
        }
    }

    #[tokio::test]
    async fn test_login_rejects_state_mismatch() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(0);
        let browser = ScriptedBrowser::new(|_| {
            Ok(BrowserOutcome::Success(
                "dk.example.tickets:/oauth2redirect?state=forged&code=c".to_string(),
            ))
        });

        let engine = engine(config(true), http, browser, &MemorySecureStore::default());
        let result = engine.login().await;

        assert!(matches!(
            result,
            AuthResult::Error(ErrorCause::ParseRedirectUri { ref error, .. }) if error == "state_mismatch"
        ));
    }

    #[tokio::test]
    async fn test_login_exchange_failure_is_get_token_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(400, json!({"error": "invalid_grant"}))));

        let engine = engine(
            config(true),
            http,
            ScriptedBrowser::new(redirect_with_code),
            &MemorySecureStore::default(),
        );

        match engine.login().await {
            AuthResult::Error(ErrorCause::GetToken(message)) => {
                assert!(message.contains("400"));
            }
            other => panic!("expected GetToken, got {:?}", other),
        }
        assert!(engine.access_token().is_none());
    }

    #[tokio::test]
    async fn test_login_requires_id_token_in_response() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            let mut body = token_response();
            body.as_object_mut().unwrap().remove("id_token");
            Ok(json_response(200, body))
        });

        let engine = engine(
            config(false),
            http,
            ScriptedBrowser::new(redirect_with_code),
            &MemorySecureStore::default(),
        );

        assert!(matches!(
            engine.login().await,
            AuthResult::Error(ErrorCause::GetToken(_))
        ));
    }

    async fn signed_in(http: MockHttpClient, browser: Arc<ScriptedBrowser>) -> (AuthCodeEngine, MemorySecureStore) {
        let secure_store = MemorySecureStore::default();
        let engine = engine(config(true), http, browser, &secure_store);
        engine
            .store
            .update(
                &jwt_expiring_at(NOW + 3, &["a"]),
                Some(&jwt_expiring_at(NOW + 1800, &[])),
                Some("id-token-1"),
            )
            .await
            .unwrap();
        (engine, secure_store)
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_grant() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .withf(|request| {
                let form = form_body(request);
                form.get("grant_type").map(String::as_str) == Some("refresh_token")
                    && form.contains_key("refresh_token")
                    && form.get("scope").map(String::as_str) == Some("openid profile")
            })
            .returning(|_| {
                Ok(json_response(
                    200,
                    json!({"access_token": jwt_expiring_at(NOW + 600, &["b"])}),
                ))
            });

        let (engine, _) = signed_in(http, ScriptedBrowser::new(|_| Ok(BrowserOutcome::UserCancelled))).await;
        assert!(engine.needs_refresh());

        assert!(engine.refresh().await);
        assert!(!engine.needs_refresh());
        assert_eq!(engine.roles(), vec!["b"]);
        assert_eq!(engine.access_token_expiry(), Some(NOW + 600));
    }

    #[tokio::test]
    async fn test_refresh_without_session_skips_network() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(0);

        let engine = engine(
            config(true),
            http,
            ScriptedBrowser::new(|_| Ok(BrowserOutcome::UserCancelled)),
            &MemorySecureStore::default(),
        );

        assert!(!engine.refresh().await);
    }

    #[tokio::test]
    async fn test_refresh_failure_returns_false() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(401, json!({"error": "invalid_grant"}))));

        let (engine, _) = signed_in(http, ScriptedBrowser::new(|_| Ok(BrowserOutcome::UserCancelled))).await;
        assert!(!engine.refresh().await);
    }

    #[tokio::test]
    async fn test_logout_without_id_token_skips_browser() {
        let browser = ScriptedBrowser::new(|_| Ok(BrowserOutcome::UserCancelled));
        let engine = engine(
            config(true),
            MockHttpClient::new(),
            browser.clone(),
            &MemorySecureStore::default(),
        );

        assert_eq!(
            engine.logout().await,
            AuthResult::Error(ErrorCause::MissingIdToken)
        );
        assert!(browser.launches().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_session_on_matching_redirect() {
        let browser = ScriptedBrowser::new(|url| {
            assert_eq!(query_param(url, "id_token_hint").as_deref(), Some("id-token-1"));
            assert_eq!(query_param(url, "client_id").as_deref(), Some("ticket-app"));
            assert!(query_param(url, "state").is_some());
            let target = query_param(url, "post_logout_redirect_uri").unwrap();
            Ok(BrowserOutcome::Success(format!("{}?state=x", target)))
        });
        let (engine, secure_store) = signed_in(MockHttpClient::new(), browser.clone()).await;

        assert_eq!(engine.logout().await, AuthResult::Success);
        assert!(engine.access_token().is_none());
        assert!(engine.roles().is_empty());
        assert!(secure_store.get(ACCESS_TOKEN_KEY).await.is_none());
        assert_eq!(browser.launches()[0].0, BrowserFlow::Logout);
    }

    #[tokio::test]
    async fn test_logout_rejects_unknown_redirect() {
        let browser = ScriptedBrowser::new(|_| {
            Ok(BrowserOutcome::Success("https://elsewhere.example/".to_string()))
        });
        let (engine, _) = signed_in(MockHttpClient::new(), browser).await;

        assert_eq!(
            engine.logout().await,
            AuthResult::Error(ErrorCause::UnknownRedirectUri {
                expected: "dk.example.tickets:/oauth2redirect".to_string(),
                actual: "https://elsewhere.example/".to_string(),
            })
        );
        assert!(engine.access_token().is_some());
    }

    #[tokio::test]
    async fn test_dispose_keeps_persisted_tokens() {
        let (engine, secure_store) = signed_in(
            MockHttpClient::new(),
            ScriptedBrowser::new(|_| Ok(BrowserOutcome::UserCancelled)),
        )
        .await;

        engine.dispose();

        assert!(engine.access_token().is_none());
        assert!(secure_store.get(ACCESS_TOKEN_KEY).await.is_some());
    }
}
