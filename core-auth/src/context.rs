//! # Session Context
//!
//! Owns one engine and its coordinator for the lifetime of a signed-in app.
//!
//! A context is created once at startup with the host bridges and passed to
//! the code that issues API calls. To reconfigure, shut the current context
//! down and create a new one.
//!
//! ```rust,ignore
//! let core = CoreConfig::builder().browser(browser).build()?;
//! let config = AuthCodeConfig::builder()
//!     .base_url("https://idp.example/realms/tickets")
//!     .client_id("ticket-app")
//!     .redirect_uri("dk.example.tickets:/oauth2redirect")
//!     .build()?;
//!
//! let context = AuthContext::auth_code(core, config).await?;
//! let coordinator = context.coordinator()?;
//! if !context.is_authorized() {
//!     coordinator.login(None);
//! }
//! ```

use crate::auth_code::AuthCodeEngine;
use crate::automated::AutomatedEngine;
use crate::config::{AuthCodeConfig, AutomatedAuthConfig};
use crate::coordinator::{FlowCallbacks, SessionCoordinator};
use crate::engine::Engine;
use crate::error::{AuthError, Result};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

pub struct AuthContext {
    engine: Arc<dyn Engine>,
    coordinator: SessionCoordinator,
    event_bus: EventBus,
}

impl AuthContext {
    /// Build a context around the authorization-code engine and restore any
    /// persisted session.
    ///
    /// # Errors
    ///
    /// Fails when a required bridge is missing, persisted tokens cannot be
    /// read, or no Tokio runtime is running.
    pub async fn auth_code(core: CoreConfig, config: AuthCodeConfig) -> Result<Self> {
        let callbacks = FlowCallbacks {
            on_auth_result: config.on_auth_result.clone(),
            on_login_result: config.on_login_result.clone(),
            on_logout_result: config.on_logout_result.clone(),
        };
        let engine = AuthCodeEngine::from_core(&core, config)?;
        engine.token_store().load().await?;

        Self::assemble(&core, Arc::new(engine), callbacks)
    }

    /// Build a context around the automated (test-mode) engine.
    pub async fn automated(core: CoreConfig, config: AutomatedAuthConfig) -> Result<Self> {
        let callbacks = FlowCallbacks {
            on_auth_result: config.on_auth_result.clone(),
            ..FlowCallbacks::default()
        };
        let engine = AutomatedEngine::from_core(&core, config)?;
        engine.token_store().load().await?;

        Self::assemble(&core, Arc::new(engine), callbacks)
    }

    fn assemble(
        core: &CoreConfig,
        engine: Arc<dyn Engine>,
        callbacks: FlowCallbacks,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            core_runtime::Error::Internal(format!("no Tokio runtime available: {}", e))
        })?;
        let event_bus = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);

        let coordinator = SessionCoordinator::builder(Arc::clone(&engine), runtime)
            .dispatcher(core.ui_dispatcher.clone())
            .callbacks(callbacks)
            .event_bus(event_bus.clone())
            .build();

        info!(authorized = engine.is_authorized(), "Session context ready");
        Ok(Self {
            engine,
            coordinator,
            event_bus,
        })
    }

    /// The coordinator to call before each API request.
    pub fn coordinator(&self) -> Result<&SessionCoordinator> {
        if self.coordinator.is_closed() {
            return Err(AuthError::NotInitialized);
        }
        Ok(&self.coordinator)
    }

    pub fn access_token(&self) -> Option<String> {
        self.engine.access_token()
    }

    pub fn roles(&self) -> Vec<String> {
        self.engine.roles()
    }

    pub fn is_authorized(&self) -> bool {
        self.engine.is_authorized()
    }

    pub fn needs_refresh(&self) -> bool {
        self.engine.needs_refresh()
    }

    /// Session events published by the coordinator.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Release the in-memory session and reject later flows. Persisted tokens
    /// are kept for the next context.
    pub fn shutdown(&self) {
        self.coordinator.close();
        self.engine.dispose();
        info!("Session context shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::test_tokens::jwt_expiring_at;
    use crate::test_support::{FixedClock, MemorySecureStore, NOW};
    use crate::token_store::{ACCESS_TOKEN_KEY, ID_TOKEN_KEY, REFRESH_TOKEN_KEY};
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bridge_traits::storage::SecureStore;
    use bridge_traits::ui::{BrowserFlow, BrowserOutcome, BrowserSurface};

    struct UnusedHttp;

    #[async_trait]
    impl HttpClient for UnusedHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            panic!("no request expected");
        }
    }

    struct CancellingBrowser;

    #[async_trait]
    impl BrowserSurface for CancellingBrowser {
        async fn launch(&self, _flow: BrowserFlow, _url: String) -> BridgeResult<BrowserOutcome> {
            Ok(BrowserOutcome::UserCancelled)
        }
    }

    fn core(secure_store: &MemorySecureStore, browser: bool) -> CoreConfig {
        let mut builder = CoreConfig::builder()
            .secure_store(Arc::new(secure_store.clone()))
            .http_client(Arc::new(UnusedHttp))
            .clock(FixedClock::new())
            .ui_dispatcher(Arc::new(bridge_traits::ui::InlineDispatcher));
        if browser {
            builder = builder.browser(Arc::new(CancellingBrowser));
        }
        builder.build().unwrap()
    }

    fn config() -> AuthCodeConfig {
        AuthCodeConfig::builder()
            .base_url("https://idp.example/realms/tickets")
            .client_id("ticket-app")
            .redirect_uri("dk.example.tickets:/oauth2redirect")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_auth_code_context_restores_persisted_session() {
        let secure_store = MemorySecureStore::default();
        secure_store
            .set_secret(ACCESS_TOKEN_KEY, jwt_expiring_at(NOW + 600, &["inspector"]).as_bytes())
            .await
            .unwrap();
        secure_store
            .set_secret(REFRESH_TOKEN_KEY, jwt_expiring_at(NOW + 3600, &[]).as_bytes())
            .await
            .unwrap();
        secure_store
            .set_secret(ID_TOKEN_KEY, b"id-token-1")
            .await
            .unwrap();

        let context = AuthContext::auth_code(core(&secure_store, true), config())
            .await
            .unwrap();

        assert!(context.is_authorized());
        assert!(!context.needs_refresh());
        assert_eq!(context.roles(), vec!["inspector"]);
        assert_eq!(
            context.coordinator().unwrap().prepare_call_async().await,
            crate::types::AuthResult::Success
        );
    }

    #[tokio::test]
    async fn test_auth_code_context_requires_browser() {
        let result = AuthContext::auth_code(core(&MemorySecureStore::default(), false), config()).await;

        assert!(matches!(
            result,
            Err(AuthError::Runtime(core_runtime::Error::CapabilityMissing { .. }))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_disposes_session_and_rejects_flows() {
        let secure_store = MemorySecureStore::default();
        secure_store
            .set_secret(ACCESS_TOKEN_KEY, jwt_expiring_at(NOW + 600, &[]).as_bytes())
            .await
            .unwrap();

        let context = AuthContext::auth_code(core(&secure_store, true), config())
            .await
            .unwrap();
        let coordinator = context.coordinator().unwrap().clone();

        context.shutdown();

        assert!(context.access_token().is_none());
        assert!(matches!(context.coordinator(), Err(AuthError::NotInitialized)));
        assert!(!coordinator.login(None));
        assert!(secure_store.get(ACCESS_TOKEN_KEY).await.is_some());
    }

    #[tokio::test]
    async fn test_automated_context_requires_user_picker() {
        let config = AutomatedAuthConfig::builder()
            .user_config(r#"{"url": "https://issuer.example/token", "users": []}"#)
            .build()
            .unwrap();

        let result = AuthContext::automated(core(&MemorySecureStore::default(), true), config).await;
        assert!(matches!(
            result,
            Err(AuthError::Runtime(core_runtime::Error::CapabilityMissing { .. }))
        ));
    }
}
