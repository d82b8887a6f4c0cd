//! # Core Configuration Module
//!
//! Collects the host bridges the session core runs on.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance holding every host capability the authentication engines need.
//! It enforces fail-fast validation so that a missing bridge is reported when
//! the configuration is built, not in the middle of a login.
//!
//! ## Required Dependencies
//!
//! - `SecureStore` - Token persistence
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `HttpClient` - Token endpoint requests (desktop default: reqwest)
//! - `Clock` - Expiry checks (default: `SystemClock`)
//! - `UiDispatcher` - Callback delivery (desktop default: dedicated UI thread,
//!   otherwise `InlineDispatcher`)
//! - `BrowserSurface` - Required by the authorization-code engine
//! - `UserPicker` - Required by the automated engine
//!
//! Engines ask for the optional bridges they need through the `require_*`
//! accessors, which return `Error::CapabilityMissing` with an actionable
//! message.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .secure_store(Arc::new(MySecureStore))
//!     .http_client(Arc::new(MyHttpClient))
//!     .browser(Arc::new(MyBrowser))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Without desktop shims there is no default secure store.
//! # #[cfg(feature = "desktop-shims")]
//! # panic!("desktop shims provide a store");
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing secure store");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    BrowserSurface, Clock, HttpClient, InlineDispatcher, SecureStore, SystemClock, UiDispatcher,
    UserPicker,
};
use std::sync::Arc;
use tracing::warn;

/// Host bridges for the session core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Secure credential storage (required)
    pub secure_store: Arc<dyn SecureStore>,

    /// HTTP client for token endpoint requests
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Time source for expiry checks
    pub clock: Arc<dyn Clock>,

    /// Delivers completion callbacks on the host's UI context
    pub ui_dispatcher: Arc<dyn UiDispatcher>,

    /// Presents authorization and logout pages
    pub browser: Option<Arc<dyn BrowserSurface>>,

    /// Lets the user pick an identity for automated login
    pub user_picker: Option<Arc<dyn UserPicker>>,

    /// Accept invalid TLS certificates (test environments only)
    pub allow_unsafe_https: bool,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("secure_store", &"SecureStore { ... }")
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("clock", &"Clock { ... }")
            .field("ui_dispatcher", &"UiDispatcher { ... }")
            .field(
                "browser",
                &self.browser.as_ref().map(|_| "BrowserSurface { ... }"),
            )
            .field(
                "user_picker",
                &self.user_picker.as_ref().map(|_| "UserPicker { ... }"),
            )
            .field("allow_unsafe_https", &self.allow_unsafe_https)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Returns the HTTP client or an actionable error.
    pub fn require_http_client(&self) -> Result<Arc<dyn HttpClient>> {
        self.http_client.clone().ok_or_else(|| Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "An HttpClient is required to reach the token endpoint. \
                      Desktop: enable the 'desktop-shims' feature to use the reqwest client. \
                      Mobile: inject the platform HTTP stack."
                .to_string(),
        })
    }

    /// Returns the browser surface or an actionable error.
    pub fn require_browser(&self) -> Result<Arc<dyn BrowserSurface>> {
        self.browser.clone().ok_or_else(|| Error::CapabilityMissing {
            capability: "BrowserSurface".to_string(),
            message: "The authorization-code engine needs a BrowserSurface to present \
                      the authorization and logout pages. Inject one with .browser()."
                .to_string(),
        })
    }

    /// Returns the user picker or an actionable error.
    pub fn require_user_picker(&self) -> Result<Arc<dyn UserPicker>> {
        self.user_picker.clone().ok_or_else(|| Error::CapabilityMissing {
            capability: "UserPicker".to_string(),
            message: "The automated engine needs a UserPicker to choose a configured \
                      identity. Inject one with .user_picker()."
                .to_string(),
        })
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for token persistence. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default KeyringSecureStore. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(allow_unsafe_https: bool) -> Result<Option<Arc<dyn HttpClient>>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_options(
        ReqwestHttpClient::DEFAULT_TIMEOUT,
        allow_unsafe_https,
    )
    .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(Some(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_allow_unsafe_https: bool) -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

#[cfg(feature = "desktop-shims")]
fn provide_default_ui_dispatcher() -> Result<Arc<dyn UiDispatcher>> {
    use bridge_desktop::ThreadDispatcher;

    let dispatcher = ThreadDispatcher::spawn()
        .map_err(|e| Error::Internal(format!("Failed to start UI dispatcher thread: {}", e)))?;
    let dispatcher: Arc<dyn UiDispatcher> = Arc::new(dispatcher);
    Ok(dispatcher)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_ui_dispatcher() -> Result<Arc<dyn UiDispatcher>> {
    let dispatcher: Arc<dyn UiDispatcher> = Arc::new(InlineDispatcher);
    Ok(dispatcher)
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    secure_store: Option<Arc<dyn SecureStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    ui_dispatcher: Option<Arc<dyn UiDispatcher>>,
    browser: Option<Arc<dyn BrowserSurface>>,
    user_picker: Option<Arc<dyn UserPicker>>,
    allow_unsafe_https: bool,
}

impl CoreConfigBuilder {
    /// Sets the secure store implementation (required).
    ///
    /// Tokens are persisted under the keys `access_token`, `refresh_token`
    /// and `id_token`.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest client is used when the `desktop-shims`
    /// feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the time source. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the dispatcher that runs callbacks on the UI context.
    pub fn ui_dispatcher(mut self, dispatcher: Arc<dyn UiDispatcher>) -> Self {
        self.ui_dispatcher = Some(dispatcher);
        self
    }

    /// Sets the browser surface used by the authorization-code engine.
    pub fn browser(mut self, browser: Arc<dyn BrowserSurface>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Sets the identity picker used by the automated engine.
    pub fn user_picker(mut self, picker: Arc<dyn UserPicker>) -> Self {
        self.user_picker = Some(picker);
        self
    }

    /// Accept invalid TLS certificates on the default HTTP client.
    ///
    /// Has no effect on an injected client. Default: false
    pub fn allow_unsafe_https(mut self, allow: bool) -> Self {
        self.allow_unsafe_https = allow;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Fails with `Error::CapabilityMissing` when no secure store is given
    /// and no desktop default is available.
    pub fn build(self) -> Result<CoreConfig> {
        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        if self.allow_unsafe_https {
            warn!("Unsafe HTTPS enabled: TLS certificate validation is disabled");
        }

        let http_client = match self.http_client {
            Some(client) => Some(client),
            None => provide_default_http_client(self.allow_unsafe_https)?,
        };

        let ui_dispatcher = match self.ui_dispatcher {
            Some(dispatcher) => dispatcher,
            None => provide_default_ui_dispatcher()?,
        };

        Ok(CoreConfig {
            secure_store,
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            ui_dispatcher,
            browser: self.browser,
            user_picker: self.user_picker,
            allow_unsafe_https: self.allow_unsafe_https,
        })
    }
}
