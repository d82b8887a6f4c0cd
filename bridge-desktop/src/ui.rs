//! UI context dispatcher for desktop hosts

use bridge_traits::{
    error::{BridgeError, Result},
    ui::{UiDispatcher, UiTask},
};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread;
use tracing::{debug, warn};

/// Runs dispatched tasks in submission order on one dedicated thread.
///
/// Desktop hosts without an event loop of their own use this thread as the
/// "UI context": every completion callback observes the same thread, and a
/// slow callback never stalls the flow that produced it. The thread exits
/// when the dispatcher is dropped.
pub struct ThreadDispatcher {
    sender: Mutex<Sender<UiTask>>,
}

impl ThreadDispatcher {
    pub const THREAD_NAME: &'static str = "ticket-auth-ui";

    /// Start the dispatcher thread.
    pub fn spawn() -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<UiTask>();

        thread::Builder::new()
            .name(Self::THREAD_NAME.to_string())
            .spawn(move || {
                debug!("UI dispatcher thread started");
                while let Ok(task) = receiver.recv() {
                    task();
                }
                debug!("UI dispatcher thread stopped");
            })
            .map_err(BridgeError::Io)?;

        Ok(Self {
            sender: Mutex::new(sender),
        })
    }
}

impl UiDispatcher for ThreadDispatcher {
    fn dispatch(&self, task: UiTask) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if sender.send(task).is_err() {
            warn!("UI dispatcher thread is gone; dropping task");
        }
    }
}
