//! Ticket app session facade.
//!
//! Re-exports the pieces a host needs to assemble an [`AuthContext`]: the
//! bridge traits it implements, the runtime configuration and logging, and
//! the authentication API. With the default `desktop-shims` feature the
//! reqwest HTTP client, OS keychain store and UI dispatcher thread are used
//! for any bridge the host does not provide.

pub use bridge_traits as bridge;
pub use core_auth as auth;
pub use core_runtime as runtime;

pub use bridge_traits::{
    BrowserFlow, BrowserOutcome, BrowserSurface, Clock, HttpClient, PickOutcome, ProviderError,
    SecureStore, UiDispatcher, UserPicker,
};
pub use core_auth::{
    AuthCodeConfig, AuthContext, AuthError, AuthResult, AutomatedAuthConfig, ErrorCause,
    SessionCoordinator,
};
pub use core_runtime::config::{CoreConfig, CoreConfigBuilder};
pub use core_runtime::events::{AuthEvent, EventStream};
pub use core_runtime::logging::{init_logging, LoggingConfig};
