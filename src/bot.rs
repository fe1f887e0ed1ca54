//! Top-level orchestrator.
//!
//! Owns the relay context and wires the pieces together:
//! connect → start inbox loop → (poller, control server) → authorize →
//! steady state until the transport ends or shutdown is requested →
//! drain webhooks and disconnect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::poller::spawn_request_poller;
use crate::auth::{CodePrompt, InboxFilter, LoginOutcome, LoginSettings, LoginWaiter};
use crate::channels::{ChatTransport, MessageStream, responders};
use crate::config::RelayConfig;
use crate::context::RelayContext;
use crate::error::Result;
use crate::scratch::CodeScratchFile;
use crate::server::ControlServer;
use crate::webhook::WebhookDispatcher;

/// How long shutdown waits for in-flight webhook deliveries.
const WEBHOOK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the steady-state loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The inbound message stream ended.
    Disconnected,
    /// The shutdown future resolved.
    Shutdown,
}

/// The relay process.
pub struct CodeRelay {
    config: RelayConfig,
    transport: Arc<dyn ChatTransport>,
    ctx: Arc<RelayContext>,
    webhook: Arc<WebhookDispatcher>,
    prompt: Option<Arc<dyn CodePrompt>>,
}

impl CodeRelay {
    pub fn new(config: RelayConfig, transport: Arc<dyn ChatTransport>) -> Self {
        let webhook = Arc::new(WebhookDispatcher::new(
            config.webhook_url.clone(),
            config.phone_number.clone(),
            config.webhook_source(),
            config.webhook_timeout,
        ));

        Self {
            config,
            transport,
            ctx: Arc::new(RelayContext::new()),
            webhook,
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CodePrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Shared state, for embedding and tests.
    pub fn context(&self) -> Arc<RelayContext> {
        Arc::clone(&self.ctx)
    }

    fn inbox_filter(&self) -> InboxFilter {
        let filter = InboxFilter::new(
            self.config.code_source_policy(),
            Arc::clone(&self.ctx),
            Arc::clone(&self.webhook),
        );
        match self.config.code_file {
            Some(ref path) => {
                let scratch = CodeScratchFile::new(path);
                info!("   Code file: {}", scratch.path().display());
                filter.with_scratch_file(scratch)
            }
            None => filter,
        }
    }

    fn login_waiter(&self) -> LoginWaiter {
        let waiter = LoginWaiter::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.ctx),
            LoginSettings::from(&self.config),
        );
        match self.prompt {
            Some(ref prompt) => waiter.with_prompt(Arc::clone(prompt)),
            None => waiter,
        }
    }

    /// Run until the transport disconnects or `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<StopReason> {
        let control = match self.config.http_port {
            Some(port) => {
                let addr = SocketAddr::from(([0, 0, 0, 0], port));
                let server = ControlServer::spawn(addr, Arc::clone(&self.ctx))?;
                info!("   Control API: http://{}", server.local_addr());
                Some(server)
            }
            None => None,
        };

        if !self.webhook.is_enabled() {
            info!("   Webhook delivery disabled (no WEBHOOK_URL)");
        }

        let waiter = self.login_waiter();
        waiter.connect().await?;

        let stream = match self.transport.messages().await {
            Ok(s) => s,
            Err(e) => {
                let _ = self.transport.disconnect().await;
                return Err(e.into());
            }
        };
        let mut inbox = self.spawn_inbox_loop(stream);

        let poller = control.as_ref().map(|_| {
            spawn_request_poller(
                Arc::clone(&self.transport),
                Arc::clone(&self.ctx),
                self.config.phone_number.clone(),
                self.config.poll_interval,
            )
        });

        let authorized = waiter.authorize().await;

        let reason = match authorized {
            Ok(outcome) => {
                if let LoginOutcome::SignedIn { origin, two_factor } = outcome {
                    info!(?origin, two_factor, "Signed in");
                }
                self.report_identity().await;

                tokio::select! {
                    _ = &mut inbox => {
                        info!("Transport disconnected");
                        Ok(StopReason::Disconnected)
                    }
                    _ = shutdown => {
                        info!("Stopping bot...");
                        Ok(StopReason::Shutdown)
                    }
                }
            }
            Err(e) => Err(e),
        };

        if let Some((handle, stop)) = poller {
            stop.store(true, Ordering::Relaxed);
            handle.abort();
        }
        inbox.abort();

        self.webhook.drain(WEBHOOK_DRAIN_TIMEOUT).await;

        // A failed login has already disconnected.
        if reason.is_ok() {
            if let Err(e) = self.transport.disconnect().await {
                warn!("⚠️ Disconnect failed: {e}");
            }
        }

        if let Some(server) = control {
            let _ = tokio::task::spawn_blocking(move || server.shutdown()).await;
        }

        reason
    }

    async fn report_identity(&self) {
        match self.transport.get_me().await {
            Ok(me) => info!("Logged in as: {}", me.describe()),
            Err(e) => warn!("⚠️ Could not fetch own account: {e}"),
        }
    }

    /// Feed every inbound message to the responders and the inbox filter.
    fn spawn_inbox_loop(&self, mut stream: MessageStream) -> JoinHandle<()> {
        let filter = self.inbox_filter();
        let transport = Arc::clone(&self.transport);

        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                filter.handle(&msg).await;
                responders::respond(transport.as_ref(), &msg).await;
            }
        })
    }
}
