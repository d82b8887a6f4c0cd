//! Session Token Storage
//!
//! Holds the in-memory [`Session`] and mirrors it to the host's secure store.
//!
//! ## Expiry policy
//!
//! Expiries are computed from each token's own `exp` claim, never from a
//! server-provided `expires_in`. Both checks apply a fixed
//! [`GRACE_PERIOD_MS`] to absorb clock skew between device and issuer:
//!
//! - `needs_refresh()`: no access token, or `now + 6s >= access expiry`
//! - `is_authorized()`: a refresh token exists and `now + 6s < refresh expiry`
//!
//! ## Persistence
//!
//! Tokens are stored under the keys `access_token`, `refresh_token` and
//! `id_token`. On [`TokenStore::load`] expiries and roles are recomputed from
//! the stored tokens; entries that no longer decode are deleted.

use crate::claims::{self, Claims};
use crate::error::{AuthError, Result};
use crate::types::Session;
use bridge_traits::storage::SecureStore;
use bridge_traits::time::Clock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const ID_TOKEN_KEY: &str = "id_token";

/// Tolerance applied to every expiry check, in milliseconds.
pub const GRACE_PERIOD_MS: i64 = 6000;

#[derive(Default)]
struct State {
    session: Session,
    roles: Vec<String>,
}

/// Owner of the current session and roles.
///
/// Writes replace the whole state under one lock, so readers see either the
/// old or the new credential set.
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
    log_claims: bool,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>, clock: Arc<dyn Clock>) -> Self {
        debug!("Initializing TokenStore");
        Self {
            secure_store,
            clock,
            state: RwLock::new(State::default()),
            log_claims: false,
        }
    }

    /// Log decoded token headers and bodies at `debug` level on every update.
    pub fn with_claim_logging(mut self, enabled: bool) -> Self {
        self.log_claims = enabled;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn deadline(&self) -> DateTime<Utc> {
        self.clock.now() + Duration::milliseconds(GRACE_PERIOD_MS)
    }

    pub fn needs_refresh(&self) -> bool {
        let state = self.read();
        match (&state.session.access_token, state.session.access_token_expiry) {
            (Some(_), Some(expiry)) => self.deadline() >= expiry,
            _ => true,
        }
    }

    pub fn is_authorized(&self) -> bool {
        let state = self.read();
        match (&state.session.refresh_token, state.session.refresh_token_expiry) {
            (Some(_), Some(expiry)) => self.deadline() < expiry,
            _ => false,
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().session.access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().session.refresh_token.clone()
    }

    pub fn id_token(&self) -> Option<String> {
        self.read().session.id_token.clone()
    }

    pub fn access_token_expiry(&self) -> Option<DateTime<Utc>> {
        self.read().session.access_token_expiry
    }

    pub fn roles(&self) -> Vec<String> {
        self.read().roles.clone()
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.read().session.clone()
    }

    /// Replace the session with newly issued tokens and persist them.
    ///
    /// `refresh_token` and `id_token` keep their current values when `None`
    /// (refresh responses may omit them). Roles are replaced from the access
    /// token. Nothing changes if a token fails to decode or persisting fails.
    #[instrument(skip_all, fields(has_refresh_token = refresh_token.is_some(), has_id_token = id_token.is_some()))]
    pub async fn update(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        id_token: Option<&str>,
    ) -> Result<()> {
        let access_claims = claims::decode(access_token)?;
        self.log_decoded("access_token", &access_claims);
        let access_expiry = timestamp(access_claims.require_exp()?)?;

        let current = self.session();
        let (refresh_token, refresh_expiry) = match refresh_token {
            Some(token) => {
                let refresh_claims = claims::decode(token)?;
                (
                    Some(token.to_string()),
                    Some(timestamp(refresh_claims.require_exp()?)?),
                )
            }
            None => (current.refresh_token, current.refresh_token_expiry),
        };
        let id_token = id_token.map(str::to_string).or(current.id_token);

        self.secure_store
            .set_secret(ACCESS_TOKEN_KEY, access_token.as_bytes())
            .await?;
        if let Some(token) = &refresh_token {
            self.secure_store
                .set_secret(REFRESH_TOKEN_KEY, token.as_bytes())
                .await?;
        }
        if let Some(token) = &id_token {
            self.secure_store
                .set_secret(ID_TOKEN_KEY, token.as_bytes())
                .await?;
        }

        let session = Session {
            access_token: Some(access_token.to_string()),
            refresh_token,
            id_token,
            access_token_expiry: Some(access_expiry),
            refresh_token_expiry: refresh_expiry,
        };

        info!(
            access_expires_at = %access_expiry,
            has_refresh_token = session.refresh_token.is_some(),
            roles = access_claims.roles.len(),
            "Session updated"
        );

        *self.write() = State {
            session,
            roles: access_claims.roles,
        };
        Ok(())
    }

    /// Reset the session and roles and delete the persisted tokens.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        self.clear_in_memory();
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, ID_TOKEN_KEY] {
            self.secure_store.delete_secret(key).await?;
        }
        info!("Session cleared");
        Ok(())
    }

    /// Reset the session and roles, leaving persisted tokens untouched.
    pub fn clear_in_memory(&self) {
        *self.write() = State::default();
    }

    /// Restore the session from the secure store.
    ///
    /// Expiries and roles are recomputed from the stored tokens. A stored
    /// token that no longer decodes wipes the persisted session.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<()> {
        let access_token = self.read_secret(ACCESS_TOKEN_KEY).await?;
        let refresh_token = self.read_secret(REFRESH_TOKEN_KEY).await?;
        let id_token = self.read_secret(ID_TOKEN_KEY).await?;

        if access_token.is_none() && refresh_token.is_none() && id_token.is_none() {
            debug!("No persisted session");
            return Ok(());
        }

        match self.restore(access_token, refresh_token, id_token) {
            Ok(state) => {
                info!(
                    has_access_token = state.session.access_token.is_some(),
                    has_refresh_token = state.session.refresh_token.is_some(),
                    "Restored persisted session"
                );
                *self.write() = state;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Persisted session is corrupted, deleting it");
                self.clear().await
            }
        }
    }

    fn restore(
        &self,
        access_token: Option<String>,
        refresh_token: Option<String>,
        id_token: Option<String>,
    ) -> Result<State> {
        let mut state = State::default();

        if let Some(token) = access_token {
            let claims = claims::decode(&token)?;
            self.log_decoded("access_token", &claims);
            state.session.access_token_expiry = Some(timestamp(claims.require_exp()?)?);
            state.session.access_token = Some(token);
            state.roles = claims.roles;
        }

        if let Some(token) = refresh_token {
            let claims = claims::decode(&token)?;
            state.session.refresh_token_expiry = Some(timestamp(claims.require_exp()?)?);
            state.session.refresh_token = Some(token);
        }

        state.session.id_token = id_token;
        Ok(state)
    }

    async fn read_secret(&self, key: &str) -> Result<Option<String>> {
        let bytes = match self.secure_store.get_secret(key).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        match String::from_utf8(bytes) {
            Ok(token) => Ok(Some(token)),
            Err(_) => {
                warn!(key = key, "Discarding unreadable persisted token");
                Ok(None)
            }
        }
    }

    fn log_decoded(&self, token: &str, claims: &Claims) {
        if self.log_claims {
            debug!(token = token, header = %claims.header, body = %claims.body, "Decoded token");
        }
    }
}

fn timestamp(exp: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(exp, 0)
        .single()
        .ok_or_else(|| AuthError::MalformedToken(format!("exp {} is out of range", exp)))
}
