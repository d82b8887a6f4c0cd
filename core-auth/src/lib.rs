//! # Authentication Module
//!
//! Client-side OAuth 2.0 / OpenID Connect session management for native apps.
//!
//! ## Overview
//!
//! This crate runs the authorization code flow (with PKCE) against a Keycloak
//! realm, keeps the resulting tokens in the host's secure store, and makes
//! sure that any number of concurrent API callers share a single in-flight
//! refresh or login.
//!
//! ## Components
//!
//! - [`claims`]: decodes JWT payloads for `exp` and realm roles
//! - [`pkce`]: verifier/challenge generation and random `state`/`nonce`
//! - [`redirect`]: classifies a redirect URI into a code or an error
//! - [`token_store`]: session state, expiry policy, persistence
//! - [`auth_code`]: the authorization code engine
//! - [`automated`]: test-mode engine backed by preconfigured users
//! - [`coordinator`]: the single-flight gate in front of an engine
//! - [`context`]: wires an engine and coordinator from host bridges
//!
//! ## Trust
//!
//! Token signatures are not verified on the client. Roles are advisory and
//! must not be used for authorization decisions.

pub mod auth_code;
pub mod automated;
pub mod claims;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod pkce;
pub mod redirect;
pub mod token_store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use auth_code::AuthCodeEngine;
pub use automated::AutomatedEngine;
pub use config::{AuthCodeConfig, AutomatedAuthConfig, AutomatedUser, Provider};
pub use context::AuthContext;
pub use coordinator::{Flow, FlowCallbacks, SessionCoordinator};
pub use engine::Engine;
pub use error::{AuthError, Result, TransportError};
pub use pkce::PkceVerifier;
pub use redirect::ParsedRedirect;
pub use token_store::TokenStore;
pub use types::{AccessTokenCallback, AuthCallback, AuthJob, AuthResult, ErrorCause, Session};
