//! HTTP control surface.
//!
//! - `POST /request-code` raises the re-request flag.
//! - `GET /get-code` reports the last captured code, or `404 pending`.
//!
//! The server runs on its own OS thread with a private runtime so a stalled
//! HTTP client can never hold up the chat runtime. The two sides share only
//! the thread-safe parts of [`RelayContext`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::context::RelayContext;
use crate::error::{Error, ServerError};

/// Shared state for control routes.
#[derive(Clone)]
pub struct ControlState {
    pub ctx: Arc<RelayContext>,
}

/// POST /request-code
///
/// Always succeeds; the poller picks the request up on its next tick.
async fn request_code(State(state): State<ControlState>) -> impl IntoResponse {
    state.ctx.clear_latest_code();
    state.ctx.request_flag.raise();
    info!("Code request received over HTTP");
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /get-code
async fn get_code(State(state): State<ControlState>) -> impl IntoResponse {
    match state.ctx.latest_code() {
        Some(captured) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "code": captured.code,
                "captured_at": captured.captured_at,
                "status": "ok",
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"status": "pending"})),
        ),
    }
}

/// Build the control routes.
pub fn control_routes(ctx: Arc<RelayContext>) -> Router {
    Router::new()
        .route("/request-code", post(request_code))
        .route("/get-code", get(get_code))
        .with_state(ControlState { ctx })
}

/// Running control server.
pub struct ControlServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ControlServer {
    /// Bind `addr` and serve on a dedicated thread.
    ///
    /// Binding happens on the caller's thread so a taken port fails fast.
    pub fn spawn(addr: SocketAddr, ctx: Arc<RelayContext>) -> Result<Self, Error> {
        let listener = std::net::TcpListener::bind(addr)
            .map_err(|source| ServerError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(ServerError::Listener)?;
        let addr = listener.local_addr().map_err(ServerError::Listener)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = control_routes(ctx);

        let thread = std::thread::Builder::new()
            .name("control-http".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("❌ Control server runtime failed to start: {e}");
                        return;
                    }
                };

                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(l) => l,
                        Err(e) => {
                            error!("❌ Control server listener failed: {e}");
                            return;
                        }
                    };
                    info!(%addr, "Control HTTP server started");
                    let result = axum::serve(listener, app)
                        .with_graceful_shutdown(async {
                            let _ = shutdown_rx.await;
                        })
                        .await;
                    if let Err(e) = result {
                        error!("❌ Control server stopped: {e}");
                    }
                });
            })
            .map_err(ServerError::Thread)?;

        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop serving and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Control server thread panicked");
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}
