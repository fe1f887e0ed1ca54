//! Gateway transport: drives a chat session through a JSON/HTTP gateway.
//!
//! The gateway owns the platform protocol and session storage. This side
//! issues auth calls and long-polls `updates` for inbound messages, the same
//! way a bot long-polls `getUpdates`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Notify;

use crate::channels::transport::{
    AccountInfo, ChatTransport, InboundMessage, MessageStream, SentCode, SignInOutcome,
};
use crate::error::{AuthError, Error, TransportError};

/// Server-side long-poll window, in seconds.
const LONG_POLL_SECS: u64 = 30;

/// Backoff after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bound on every non-polling gateway call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack on top of the long-poll window before a poll counts as stalled.
const LONG_POLL_MARGIN: Duration = Duration::from_secs(10);

/// One entry of an `updates` response.
#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct AuthStatus {
    authorized: bool,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    error: String,
}

/// Session settings passed to the gateway on connect.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub api_id: i32,
    pub api_hash: SecretString,
    pub session_name: String,
}

/// Set by `disconnect`; ends the update listener.
#[derive(Debug, Default)]
struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    async fn closed(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// Why a single `updates` poll produced nothing.
enum PollFailure {
    /// The gateway no longer knows this session; stop listening.
    Terminal(reqwest::StatusCode),
    /// Worth retrying after a delay.
    Retry(String),
}

/// [`ChatTransport`] backed by an HTTP gateway.
pub struct GatewayTransport {
    base_url: String,
    session: GatewaySession,
    client: reqwest::Client,
    request_timeout: Duration,
    close: Arc<CloseSignal>,
}

impl GatewayTransport {
    pub fn new(base_url: impl Into<String>, session: GatewaySession) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            client: reqwest::Client::new(),
            request_timeout: REQUEST_TIMEOUT,
            close: Arc::default(),
        }
    }

    /// Override the per-call timeout for auth and send calls.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn post(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, TransportError> {
        self.client
            .post(self.api_url(method))
            .header("x-session", &self.session.session_name)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(method, e))
    }

    async fn get(&self, method: &str) -> Result<reqwest::Response, TransportError> {
        self.client
            .get(self.api_url(method))
            .header("x-session", &self.session.session_name)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(method, e))
    }

    /// Fail on non-2xx, then decode the JSON body.
    async fn decode<T: DeserializeOwned>(
        method: &str,
        resp: reqwest::Response,
    ) -> Result<T, TransportError> {
        let resp = Self::ensure_success(method, resp).await?;
        resp.json()
            .await
            .map_err(|e| TransportError::from_reqwest(method, e))
    }

    async fn ensure_success(
        method: &str,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(TransportError::RequestFailed {
            method: method.to_string(),
            reason: format!("{status}: {body}"),
        })
    }

    /// Read the gateway's error string from a rejected auth call.
    async fn rejection_reason(resp: reqwest::Response) -> String {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        serde_json::from_str::<GatewayErrorBody>(&text)
            .ok()
            .map(|b| b.error)
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("{status}: {text}"))
    }
}

fn is_rejection(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 400 | 401 | 403)
}

/// Statuses after which polling again cannot succeed.
fn is_terminal_poll_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 401 | 410)
}

/// One long-poll round against `updates`.
async fn poll_updates(
    client: &reqwest::Client,
    url: &str,
    session_name: &str,
    offset: i64,
) -> Result<Vec<Update>, PollFailure> {
    let body = serde_json::json!({
        "offset": offset,
        "timeout": LONG_POLL_SECS,
    });

    let resp = client
        .post(url)
        .header("x-session", session_name)
        .timeout(Duration::from_secs(LONG_POLL_SECS) + LONG_POLL_MARGIN)
        .json(&body)
        .send()
        .await
        .map_err(|e| PollFailure::Retry(format!("poll error: {e}")))?;

    let status = resp.status();
    if is_terminal_poll_status(status) {
        return Err(PollFailure::Terminal(status));
    }
    if !status.is_success() {
        return Err(PollFailure::Retry(format!("poll rejected: {status}")));
    }

    resp.json::<UpdatesResponse>()
        .await
        .map(|data| data.result)
        .map_err(|e| PollFailure::Retry(format!("parse error: {e}")))
}

#[async_trait]
impl ChatTransport for GatewayTransport {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.close.reopen();
        let resp = self
            .post(
                "connect",
                serde_json::json!({
                    "api_id": self.session.api_id,
                    "api_hash": self.session.api_hash.expose_secret(),
                    "session": self.session.session_name,
                }),
            )
            .await?;
        Self::ensure_success("connect", resp).await?;
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, TransportError> {
        let resp = self.get("auth/status").await?;
        let status: AuthStatus = Self::decode("auth/status", resp).await?;
        Ok(status.authorized)
    }

    async fn send_code_request(&self, phone: &str) -> Result<SentCode, TransportError> {
        let resp = self
            .post("auth/send-code", serde_json::json!({ "phone": phone }))
            .await?;
        Self::decode("auth/send-code", resp).await
    }

    async fn sign_in(
        &self,
        phone: &str,
        code: &str,
        phone_code_hash: &str,
    ) -> Result<SignInOutcome, Error> {
        let resp = self
            .post(
                "auth/sign-in",
                serde_json::json!({
                    "phone": phone,
                    "code": code,
                    "phone_code_hash": phone_code_hash,
                }),
            )
            .await?;

        if is_rejection(resp.status()) {
            let reason = Self::rejection_reason(resp).await;
            return Err(AuthError::InvalidCode { reason }.into());
        }

        let body: SignInResponse = Self::decode("auth/sign-in", resp).await?;
        match body.status.as_str() {
            "authorized" | "ok" => Ok(SignInOutcome::Authorized),
            "password_required" => Ok(SignInOutcome::PasswordRequired),
            other => Err(TransportError::InvalidResponse {
                method: "auth/sign-in".into(),
                reason: format!("unknown status {other:?}"),
            }
            .into()),
        }
    }

    async fn check_password(&self, password: &SecretString) -> Result<(), Error> {
        let resp = self
            .post(
                "auth/check-password",
                serde_json::json!({ "password": password.expose_secret() }),
            )
            .await?;

        if is_rejection(resp.status()) {
            let reason = Self::rejection_reason(resp).await;
            return Err(AuthError::InvalidPassword { reason }.into());
        }

        Self::ensure_success("auth/check-password", resp).await?;
        Ok(())
    }

    async fn get_me(&self) -> Result<AccountInfo, TransportError> {
        let resp = self.get("me").await?;
        Self::decode("me", resp).await
    }

    async fn messages(&self) -> Result<MessageStream, TransportError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("updates");
        let session_name = self.session.session_name.clone();
        let client = self.client.clone();
        let close = Arc::clone(&self.close);

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Gateway transport listening for messages...");

            loop {
                let polled = tokio::select! {
                    _ = close.closed() => break,
                    polled = poll_updates(&client, &url, &session_name, offset) => polled,
                };

                let updates = match polled {
                    Ok(updates) => updates,
                    Err(PollFailure::Terminal(status)) => {
                        tracing::warn!(%status, "⚠️ Gateway ended the session");
                        break;
                    }
                    Err(PollFailure::Retry(reason)) => {
                        tracing::warn!("Gateway {reason}");
                        tokio::select! {
                            _ = close.closed() => break,
                            _ = tokio::time::sleep(POLL_RETRY_DELAY) => continue,
                        }
                    }
                };

                for update in updates {
                    // Advance offset past this update
                    offset = offset.max(update.update_id + 1);

                    let Some(message) = update.message else {
                        continue;
                    };

                    if tx.send(message).is_err() {
                        tracing::info!("Gateway listener channel closed");
                        return;
                    }
                }
            }

            // Dropping `tx` ends the stream.
            tracing::info!("Gateway listener stopped");
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        let resp = self
            .post(
                "messages/send",
                serde_json::json!({ "chat_id": chat_id, "text": text }),
            )
            .await?;
        Self::ensure_success("messages/send", resp).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.close.close();
        let resp = self.post("disconnect", serde_json::json!({})).await?;
        Self::ensure_success("disconnect", resp).await?;
        tracing::info!("Gateway transport disconnected");
        Ok(())
    }
}
