//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the session core:
//! - Logging and tracing infrastructure
//! - Host bridge configuration
//! - Event bus for session lifecycle events
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the authentication crate depends
//! on. It establishes the logging conventions, the fail-fast configuration of
//! host capabilities, and the broadcast mechanism used to publish session
//! events.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
