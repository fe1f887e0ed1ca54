//! Webhook delivery of captured codes to CI/CD.
//!
//! Deliveries are detached from the inbox filter but tracked in a bounded
//! [`JoinSet`] so shutdown can wait for them instead of dropping them.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::WebhookError;

/// Deliveries allowed in flight before `dispatch` waits for one to finish.
const MAX_IN_FLIGHT: usize = 8;

/// JSON body posted to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub code: String,
    pub message: String,
    pub phone_number: String,
    pub source: String,
}

/// Post one payload. Only a 200 counts as delivered.
pub async fn deliver(
    client: &reqwest::Client,
    url: &str,
    payload: &WebhookPayload,
) -> Result<(), WebhookError> {
    let resp = client.post(url).json(payload).send().await?;

    let status = resp.status();
    if status == reqwest::StatusCode::OK {
        return Ok(());
    }

    let body = resp.text().await.unwrap_or_default();
    Err(WebhookError::Status {
        status: status.as_u16(),
        body,
    })
}

fn log_delivery(code: &str, result: Result<(), WebhookError>) {
    match result {
        Ok(()) => info!("✅ Code successfully sent to webhook: {code}"),
        Err(e @ WebhookError::Status { .. }) => warn!("⚠️ {e}"),
        Err(e @ WebhookError::Timeout) => warn!("⏱️ {e}"),
        Err(e @ WebhookError::Connect(_)) => error!("❌ {e}"),
        Err(e @ WebhookError::Unexpected(_)) => error!("❌ {e}"),
    }
}

/// Fire-and-forget webhook sender with drain-on-shutdown.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: Option<String>,
    phone_number: String,
    source: String,
    tasks: Mutex<JoinSet<()>>,
}

impl WebhookDispatcher {
    /// `url = None` disables delivery.
    pub fn new(
        url: Option<String>,
        phone_number: impl Into<String>,
        source: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client for webhook: {e}");
                reqwest::Client::new()
            });

        Self {
            client,
            url,
            phone_number: phone_number.into(),
            source: source.into(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Build the payload for a captured code.
    pub fn payload(&self, code: &str, message: &str) -> WebhookPayload {
        WebhookPayload {
            code: code.to_string(),
            message: message.to_string(),
            phone_number: self.phone_number.clone(),
            source: self.source.clone(),
        }
    }

    /// Queue a delivery and return without waiting for it.
    pub async fn dispatch(&self, code: &str, message: &str) {
        let Some(url) = self.url.clone() else {
            return;
        };

        let payload = self.payload(code, message);
        let client = self.client.clone();
        let mut tasks = self.tasks.lock().await;

        while tasks.try_join_next().is_some() {}
        if tasks.len() >= MAX_IN_FLIGHT {
            debug!(in_flight = tasks.len(), "Webhook deliveries saturated, waiting");
            tasks.join_next().await;
        }

        tasks.spawn(async move {
            let result = deliver(&client, &url, &payload).await;
            log_delivery(&payload.code, result);
        });
    }

    /// Wait up to `timeout` for outstanding deliveries, then abort the rest.
    ///
    /// Returns how many were aborted.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        if tasks.is_empty() {
            return 0;
        }

        info!(pending = tasks.len(), "Waiting for webhook deliveries");
        let finished = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if finished.is_ok() {
            return 0;
        }

        let aborted = tasks.len();
        warn!(aborted, "⏱️ Webhook deliveries still pending at shutdown, aborting");
        tasks.shutdown().await;
        aborted
    }
}
