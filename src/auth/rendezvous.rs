//! Single-slot handoff between the inbox filter and the login waiter.
//!
//! `publish` buffers a code even when nobody is waiting; `await_code` takes
//! it exactly once. Publishing over an unconsumed code replaces it
//! (last write wins) and the superseded value is handed back to the caller.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Buffered single-value rendezvous.
#[derive(Debug, Default)]
pub struct CodeRendezvous {
    slot: Mutex<Option<String>>,
    signal: Notify,
}

impl CodeRendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `code` and wake a waiter. Returns the unconsumed code it replaced, if any.
    pub fn publish(&self, code: impl Into<String>) -> Option<String> {
        let code = code.into();
        let superseded = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.replace(code.clone())
        };

        if let Some(ref old) = superseded {
            if *old != code {
                warn!(
                    previous = %old,
                    current = %code,
                    "⚠️ Unconsumed login code overwritten by a newer one"
                );
            }
        }

        // Stores a permit when nobody is waiting yet.
        self.signal.notify_one();
        superseded
    }

    /// Wait up to `timeout` for a code. Consumes it on success.
    ///
    /// `None` means the timeout elapsed with nothing published; it is not an error.
    pub async fn await_code(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(code) = self.take() {
                debug!("Login code consumed from rendezvous");
                return Some(code);
            }

            // A leftover permit from an already-consumed publish wakes us with an
            // empty slot; loop and wait again until the deadline.
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Whether a code is buffered and not yet consumed.
    pub fn is_pending(&self) -> bool {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn take(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}
