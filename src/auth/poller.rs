//! Re-request poller: turns `POST /request-code` into a fresh code request.
//!
//! The HTTP thread only raises the [`RequestFlag`](crate::context::RequestFlag);
//! this loop, running on the chat runtime, notices it on the next tick,
//! clears it, and asks the platform for a new code. The new session token
//! replaces the old one in the context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::waiter::request_code;
use crate::channels::ChatTransport;
use crate::context::RelayContext;
use crate::error::TransportError;

/// Shortest tick the poller accepts.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Spawn the poller. Set the returned flag to stop it.
pub fn spawn_request_poller(
    transport: Arc<dyn ChatTransport>,
    ctx: Arc<RelayContext>,
    phone_number: String,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let interval = interval.max(MIN_POLL_INTERVAL);

    let handle = tokio::spawn(async move {
        info!(
            "Code request poller started — checking every {}ms",
            interval.as_millis()
        );

        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Code request poller shutting down");
                return;
            }

            poll_once(transport.as_ref(), &ctx, &phone_number).await;
        }
    });

    (handle, shutdown_flag)
}

/// Run a single check. Returns whether a code request was issued.
pub async fn poll_once(
    transport: &dyn ChatTransport,
    ctx: &RelayContext,
    phone_number: &str,
) -> bool {
    if !ctx.request_flag.take() {
        return false;
    }

    info!("New code requested over HTTP");
    match request_code(transport, ctx, phone_number).await {
        Ok(_) => debug!("Session token refreshed"),
        Err(e @ TransportError::RequestTimeout { .. }) => warn!("⏱️ Code re-request: {e}"),
        Err(e @ TransportError::Disconnected) => warn!("⚠️ Code re-request: {e}"),
        Err(e) => error!("❌ Code re-request failed: {e}"),
    }
    true
}
