//! # Session Coordinator
//!
//! Single-flight gate in front of an [`Engine`].
//!
//! ## Overview
//!
//! Any number of threads may call [`SessionCoordinator::prepare_call`] before
//! issuing an authenticated request. While the access token is valid the call
//! returns immediately. Once it needs refresh, exactly one caller becomes the
//! *driver* and starts a refresh (escalating to an interactive login if the
//! refresh fails); every other caller waits on the same gate and receives the
//! same [`AuthResult`].
//!
//! ## Gate
//!
//! The gate is a one-shot completion signal held in a swappable slot.
//! Becoming the driver means installing a new gate into the empty slot; only
//! one concurrent attempt can succeed. [`login`](SessionCoordinator::login)
//! and [`logout`](SessionCoordinator::logout) use the same slot, so at most
//! one of login, logout and refresh is in flight at any time. A login or
//! logout requested while the slot is held is rejected, not queued.
//!
//! ## Wake-up
//!
//! When a flow finishes, the coordinator records the result on every
//! registered [`AuthJob`], drops fire-and-forget jobs, opens the gate, and
//! only then schedules job callbacks and the per-flow and global observers on
//! the host's [`UiDispatcher`]. A panicking engine still wakes every waiter
//! with `Error(GetToken)`. Engines persist tokens before
//! returning, so every waiter observes the final session after waking.
//!
//! ## Usage
//!
//! ```rust,ignore
//! // From a plain worker thread before each API request:
//! match coordinator.prepare_call() {
//!     AuthResult::Success => send_request(coordinator_token()),
//!     AuthResult::CancelledFlow => show_signed_out(),
//!     AuthResult::Error(cause) => report(cause),
//! }
//! ```

use crate::engine::Engine;
use crate::types::{AuthCallback, AuthJob, AuthResult, ErrorCause};
use bridge_traits::ui::UiDispatcher;
use core_runtime::events::{AuthEvent, EventBus};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The kind of flow currently holding the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Login,
    Logout,
    Refresh,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Login => write!(f, "login"),
            Flow::Logout => write!(f, "logout"),
            Flow::Refresh => write!(f, "refresh"),
        }
    }
}

/// Observers notified when a flow completes.
#[derive(Clone, Default)]
pub struct FlowCallbacks {
    /// Every completed flow, refreshes included.
    pub on_auth_result: Option<AuthCallback>,
    /// Login flows, including a refresh that escalated to login.
    pub on_login_result: Option<AuthCallback>,
    pub on_logout_result: Option<AuthCallback>,
}

impl fmt::Debug for FlowCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowCallbacks")
            .field("on_auth_result", &self.on_auth_result.is_some())
            .field("on_login_result", &self.on_login_result.is_some())
            .field("on_logout_result", &self.on_logout_result.is_some())
            .finish()
    }
}

/// One-shot completion signal. The value stays readable after it opens, so
/// a waiter that subscribes late still sees the result.
struct Gate {
    sender: watch::Sender<Option<AuthResult>>,
}

impl Gate {
    fn new() -> Arc<Self> {
        let (sender, _) = watch::channel(None);
        Arc::new(Self { sender })
    }

    fn open(&self, result: AuthResult) {
        self.sender.send_replace(Some(result));
    }

    async fn wait(&self) -> AuthResult {
        let mut receiver = self.sender.subscribe();
        let result = match receiver.wait_for(Option::is_some).await {
            Ok(result) => (*result).clone().unwrap_or(AuthResult::CancelledFlow),
            Err(_) => AuthResult::CancelledFlow,
        };
        result
    }
}

struct CoordinatorInner {
    engine: Arc<dyn Engine>,
    dispatcher: Arc<dyn UiDispatcher>,
    runtime: Handle,
    jobs: Mutex<HashMap<u64, AuthJob>>,
    next_job_id: AtomicU64,
    gate: Mutex<Option<Arc<Gate>>>,
    callbacks: FlowCallbacks,
    event_bus: Option<EventBus>,
    closed: AtomicBool,
}

/// Coordinates concurrent callers around a single in-flight auth flow.
///
/// Cheap to clone; clones share the gate and job registry.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<CoordinatorInner>,
    wait_timeout: Option<Duration>,
}

impl SessionCoordinator {
    pub fn builder(engine: Arc<dyn Engine>, runtime: Handle) -> SessionCoordinatorBuilder {
        SessionCoordinatorBuilder {
            engine,
            runtime,
            dispatcher: None,
            callbacks: FlowCallbacks::default(),
            event_bus: None,
        }
    }

    /// Bound how long a waiter blocks on an in-flight flow.
    ///
    /// A waiter that times out deregisters its job and returns
    /// `Error(GetToken)`; the flow itself keeps running.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.inner.engine
    }

    /// Make sure a usable access token is held before an API call.
    ///
    /// Blocks the calling thread until any in-flight flow completes.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context; use
    /// [`prepare_call_async`](Self::prepare_call_async) there.
    pub fn prepare_call(&self) -> AuthResult {
        if !self.inner.engine.needs_refresh() {
            return AuthResult::Success;
        }
        self.inner.runtime.block_on(self.prepare_call_async())
    }

    pub async fn prepare_call_async(&self) -> AuthResult {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return AuthResult::Error(ErrorCause::GetToken(
                "session has been shut down".to_string(),
            ));
        }
        if !inner.engine.needs_refresh() {
            return AuthResult::Success;
        }

        let job_id = inner.register_job(false, None);
        debug!(job_id, "Token needs refresh, pausing call");

        let gate = match inner.try_become_driver() {
            Ok(gate) => {
                info!(job_id, "Refreshing token");
                inner.runtime.spawn(Arc::clone(inner).drive(Flow::Refresh));
                gate
            }
            Err(gate) => {
                debug!(job_id, "Flow in progress, awaiting completion");
                gate
            }
        };

        let fallback = match self.wait_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, gate.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    inner.remove_job(job_id);
                    warn!(job_id, timeout_ms = timeout.as_millis() as u64, "Timed out waiting for auth flow");
                    return AuthResult::Error(ErrorCause::GetToken(format!(
                        "timed out after {}ms waiting for authentication",
                        timeout.as_millis()
                    )));
                }
            },
            None => gate.wait().await,
        };

        let result = inner
            .remove_job(job_id)
            .and_then(|job| job.result)
            .unwrap_or(fallback);
        debug!(job_id, result = %result, "Resuming call");
        result
    }

    /// Start an interactive login.
    ///
    /// Clears the current session first. Returns `false` when another flow
    /// holds the gate; the request is dropped, not queued.
    pub fn login(&self, callback: Option<AuthCallback>) -> bool {
        self.start(Flow::Login, callback)
    }

    /// Start a logout. Returns `false` when another flow holds the gate.
    pub fn logout(&self, callback: Option<AuthCallback>) -> bool {
        self.start(Flow::Logout, callback)
    }

    /// Drop the session and delete persisted tokens.
    pub fn clear_token(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.engine.clear().await })
    }

    /// Reject any later flow. A flow already in flight still completes.
    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether a flow currently holds the gate.
    pub fn is_busy(&self) -> bool {
        self.inner.lock_gate().is_some()
    }

    #[cfg(test)]
    pub(crate) fn pending_jobs(&self) -> usize {
        self.inner.lock_jobs().len()
    }

    fn start(&self, flow: Flow, callback: Option<AuthCallback>) -> bool {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            warn!(flow = %flow, "Session has been shut down, ignoring request");
            return false;
        }

        if inner.try_become_driver().is_err() {
            match flow {
                Flow::Logout => warn!("Cannot logout while login or token refresh is in progress"),
                _ => warn!("Login already in progress"),
            }
            return false;
        }

        let job_id = inner.register_job(true, callback);
        info!(job_id, flow = %flow, "Starting flow");

        inner.runtime.spawn(Arc::clone(inner).drive(flow));
        true
    }
}

impl fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("busy", &self.is_busy())
            .field("closed", &self.is_closed())
            .field("wait_timeout", &self.wait_timeout)
            .field("callbacks", &self.inner.callbacks)
            .finish_non_exhaustive()
    }
}

impl CoordinatorInner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<u64, AuthJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_gate(&self) -> MutexGuard<'_, Option<Arc<Gate>>> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register_job(&self, no_return: bool, callback: Option<AuthCallback>) -> u64 {
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        self.lock_jobs()
            .insert(id, AuthJob::new(id, no_return, callback));
        id
    }

    fn remove_job(&self, id: u64) -> Option<AuthJob> {
        self.lock_jobs().remove(&id)
    }

    /// Install a fresh gate if the slot is empty. On failure returns the gate
    /// currently installed.
    fn try_become_driver(&self) -> Result<Arc<Gate>, Arc<Gate>> {
        let mut slot = self.lock_gate();
        match slot.as_ref() {
            Some(existing) => Err(Arc::clone(existing)),
            None => {
                let gate = Gate::new();
                *slot = Some(Arc::clone(&gate));
                Ok(gate)
            }
        }
    }

    /// Run `flow` as the gate holder and wake every waiter when it ends.
    ///
    /// A panic inside the engine is reported as a failed flow so the gate is
    /// always released.
    async fn drive(self: Arc<Self>, flow: Flow) {
        let outcome = AssertUnwindSafe(self.run_flow(flow)).catch_unwind().await;
        let (flow, result) = match outcome {
            Ok(completed) => completed,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(flow = %flow, panic = %message, "Auth flow panicked");
                let cause = ErrorCause::GetToken(format!("{} flow panicked: {}", flow, message));
                (flow, AuthResult::Error(cause))
            }
        };
        self.wake_threads(flow, result);
    }

    /// Returns the flow that actually completed; a refresh may end as a login.
    async fn run_flow(&self, flow: Flow) -> (Flow, AuthResult) {
        match flow {
            Flow::Refresh => {
                self.emit(AuthEvent::TokenRefreshing);
                if self.engine.refresh().await {
                    info!("Refresh succeeded, resuming calls in progress");
                    return (Flow::Refresh, AuthResult::Success);
                }

                info!("Token could not be refreshed, attempting login");
                self.emit(AuthEvent::SigningIn {
                    trigger: "refresh_fallback".to_string(),
                });
                (Flow::Login, self.engine.login().await)
            }
            Flow::Login => {
                self.emit(AuthEvent::SigningIn {
                    trigger: "login".to_string(),
                });
                self.engine.clear().await;
                (Flow::Login, self.engine.login().await)
            }
            Flow::Logout => (Flow::Logout, self.engine.logout().await),
        }
    }

    /// Deliver `result` to every registered job and release the gate.
    ///
    /// Callbacks are dispatched only after the gate is open, so a callback
    /// may start the next flow.
    pub(crate) fn wake_threads(&self, flow: Flow, result: AuthResult) {
        let callbacks: Vec<AuthCallback> = {
            let mut jobs = self.lock_jobs();
            let callbacks = jobs
                .values_mut()
                .filter_map(|job| {
                    job.result = Some(result.clone());
                    job.callback.clone()
                })
                .collect();
            jobs.retain(|_, job| !job.no_return);
            callbacks
        };

        let gate = self.lock_gate().take();
        match gate {
            Some(gate) => gate.open(result.clone()),
            None => warn!(flow = %flow, "Flow completed without holding the gate"),
        }
        info!(flow = %flow, result = %result, "Flow completed");

        for callback in callbacks {
            self.dispatch(callback, result.clone());
        }

        let flow_callback = match flow {
            Flow::Login => self.callbacks.on_login_result.clone(),
            Flow::Logout => self.callbacks.on_logout_result.clone(),
            Flow::Refresh => None,
        };
        if let Some(callback) = flow_callback {
            self.dispatch(callback, result.clone());
        }
        if let Some(callback) = self.callbacks.on_auth_result.clone() {
            self.dispatch(callback, result.clone());
        }

        let event = match (&result, flow) {
            (AuthResult::Success, Flow::Login) => AuthEvent::SignedIn,
            (AuthResult::Success, Flow::Logout) => AuthEvent::SignedOut,
            (AuthResult::Success, Flow::Refresh) => AuthEvent::TokenRefreshed {
                expires_at: self.engine.access_token_expiry(),
            },
            (AuthResult::CancelledFlow, _) => AuthEvent::FlowCancelled {
                flow: flow.to_string(),
            },
            (AuthResult::Error(cause), _) => AuthEvent::AuthError {
                message: cause.to_string(),
                recoverable: true,
            },
        };
        self.emit(event);
    }

    fn dispatch(&self, callback: AuthCallback, result: AuthResult) {
        self.dispatcher.dispatch(Box::new(move || callback(result)));
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`SessionCoordinator`].
pub struct SessionCoordinatorBuilder {
    engine: Arc<dyn Engine>,
    runtime: Handle,
    dispatcher: Option<Arc<dyn UiDispatcher>>,
    callbacks: FlowCallbacks,
    event_bus: Option<EventBus>,
}

impl SessionCoordinatorBuilder {
    /// Context on which callbacks run. Defaults to running them inline on
    /// the runtime thread that completed the flow.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn UiDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn callbacks(mut self, callbacks: FlowCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> SessionCoordinator {
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(bridge_traits::ui::InlineDispatcher));

        SessionCoordinator {
            inner: Arc::new(CoordinatorInner {
                engine: self.engine,
                dispatcher,
                runtime: self.runtime,
                jobs: Mutex::new(HashMap::new()),
                next_job_id: AtomicU64::new(1),
                gate: Mutex::new(None),
                callbacks: self.callbacks,
                event_bus: self.event_bus,
                closed: AtomicBool::new(false),
            }),
            wait_timeout: None,
        }
    }
}
