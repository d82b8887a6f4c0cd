//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (rustls)
//! - `SecureStore` using the `keyring` crate
//! - `UiDispatcher` using a dedicated callback thread
//!
//! The browser surface and the identity picker are host UI and have no
//! desktop default.
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{KeyringSecureStore, ReqwestHttpClient, ThreadDispatcher};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let store = KeyringSecureStore::new();
//! let dispatcher = ThreadDispatcher::spawn()?;
//! ```

mod http;
mod ui;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use http::ReqwestHttpClient;
pub use ui::ThreadDispatcher;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
