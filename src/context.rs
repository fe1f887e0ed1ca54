//! Shared relay state, owned by the orchestrator and passed by reference.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::CodeRendezvous;

/// Work-request latch set by the HTTP control surface and cleared by the poller.
///
/// Repeated raises before the poller looks collapse into one request.
#[derive(Debug, Default)]
pub struct RequestFlag(AtomicBool);

impl RequestFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A code captured from chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedCode {
    pub code: String,
    pub captured_at: DateTime<Utc>,
}

/// All cross-task state of one relay instance.
#[derive(Debug, Default)]
pub struct RelayContext {
    /// Handoff from the inbox filter to the login waiter.
    pub rendezvous: CodeRendezvous,
    /// Re-request latch.
    pub request_flag: RequestFlag,
    latest_code: Mutex<Option<CapturedCode>>,
    session_token: Mutex<Option<String>>,
}

impl RelayContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a capture for `GET /get-code` and hand it to the waiter.
    pub fn capture(&self, code: &str) -> Option<String> {
        *self.latest_code.lock().unwrap_or_else(|e| e.into_inner()) = Some(CapturedCode {
            code: code.to_string(),
            captured_at: Utc::now(),
        });
        self.rendezvous.publish(code)
    }

    /// Last code captured since the board was cleared.
    pub fn latest_code(&self) -> Option<CapturedCode> {
        self.latest_code
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear_latest_code(&self) {
        self.latest_code
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// Store the `phone_code_hash` from the most recent code request.
    pub fn set_session_token(&self, token: impl Into<String>) {
        *self.session_token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    pub fn session_token(&self) -> Option<String> {
        self.session_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
