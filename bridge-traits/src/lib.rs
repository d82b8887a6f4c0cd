//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the session core and the host.
//! Each trait is a capability the core requires but cannot implement portably.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Token endpoint requests
//!
//! ### Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Keystore)
//!
//! ### UI Integration
//! - [`BrowserSurface`](ui::BrowserSurface) - Authorization and logout pages
//! - [`UserPicker`](ui::UserPicker) - Identity selection for automated login
//! - [`UiDispatcher`](ui::UiDispatcher) - Callback delivery on the main/UI context
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic expiry checks
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Http, SecureStore, UiDispatcher |
//! | Android  | Host app            | 📋 Planned |
//! | iOS      | Host app            | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Platform implementations should convert platform-specific errors to
//! `BridgeError` with actionable messages.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so one implementation can be shared
//! between the coordinator's runtime and any thread that calls into it.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;
pub mod ui;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::SecureStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
pub use ui::{
    BrowserFlow, BrowserOutcome, BrowserSurface, InlineDispatcher, PickOutcome, ProviderError,
    UiDispatcher, UiTask, UserPicker,
};
