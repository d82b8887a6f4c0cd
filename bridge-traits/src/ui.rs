//! UI Surface Abstractions
//!
//! Capabilities the host supplies so the core can run interactive flows
//! without owning any UI objects:
//! - [`BrowserSurface`] shows an authorization or logout page and reports how
//!   it finished
//! - [`UserPicker`] lets a tester choose a preconfigured identity
//! - [`UiDispatcher`] marshals callbacks onto the host's main/UI context

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Which protocol step a browser launch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowserFlow {
    Authorization,
    Logout,
}

impl fmt::Display for BrowserFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserFlow::Authorization => write!(f, "authorization"),
            BrowserFlow::Logout => write!(f, "logout"),
        }
    }
}

/// Error reported by the identity provider inside the browser flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub error: String,
    pub description: String,
}

impl ProviderError {
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.description)
    }
}

/// How a browser round-trip ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The user closed the page or backed out.
    UserCancelled,
    /// The provider redirected back; carries the full redirect URI.
    Success(String),
    /// The provider reported an error before redirecting.
    ProviderError(ProviderError),
    /// The surface finished in a way it could not classify.
    Unrecognized(String),
}

/// Host browser capability.
///
/// Implementations display `url` (custom tab, system browser, embedded web
/// view) and resolve once the flow finishes. They are responsible for
/// presenting on the main/UI thread; the core awaits the result from its
/// background runtime.
///
/// # Errors
///
/// Return `Err` only when the page could not be shown at all. Everything that
/// happens after a successful launch is a [`BrowserOutcome`].
#[async_trait]
pub trait BrowserSurface: Send + Sync {
    async fn launch(&self, flow: BrowserFlow, url: String) -> Result<BrowserOutcome>;
}

/// Result of presenting the user picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickOutcome {
    Selected(usize),
    Cancelled,
}

/// Presents a list of user titles and reports which one was chosen.
#[async_trait]
pub trait UserPicker: Send + Sync {
    async fn pick(&self, titles: Vec<String>) -> Result<PickOutcome>;
}

/// Task scheduled on the host's main/UI context.
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Marshals work onto the host's main/UI context.
///
/// `dispatch` must not block and must run tasks in submission order.
pub trait UiDispatcher: Send + Sync {
    fn dispatch(&self, task: UiTask);
}

/// Dispatcher that runs every task immediately on the calling thread.
///
/// Suitable for headless hosts and tests where there is no dedicated UI
/// thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl UiDispatcher for InlineDispatcher {
    fn dispatch(&self, task: UiTask) {
        task();
    }
}
