use crate::types::AuthResult;
use async_trait::async_trait;

/// Capability set the coordinator drives.
///
/// Engines own the token store and run one protocol flow per call. The
/// coordinator guarantees at most one of `login`, `logout` and `refresh` is
/// in flight at a time; engines convert every local failure into an
/// [`AuthResult`] instead of returning errors.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run an interactive login to completion.
    async fn login(&self) -> AuthResult;

    /// Run a logout to completion.
    async fn logout(&self) -> AuthResult;

    /// Attempt a silent refresh. `false` means the caller should fall back
    /// to an interactive login.
    async fn refresh(&self) -> bool;

    /// Reset the session and delete the persisted tokens.
    async fn clear(&self);

    fn needs_refresh(&self) -> bool;

    fn is_authorized(&self) -> bool;

    fn access_token(&self) -> Option<String>;

    fn roles(&self) -> Vec<String>;

    /// Access token expiry as Unix seconds, if a token is held.
    fn access_token_expiry(&self) -> Option<i64>;

    /// Release the in-memory session without touching persisted tokens.
    fn dispose(&self);
}
