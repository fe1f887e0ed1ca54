//! Chat transport abstraction.
//!
//! The relay never speaks the chat platform's wire protocol itself; it drives
//! a [`ChatTransport`] that owns the session and hands back inbound messages
//! as a stream.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::auth::SenderIdentity;
use crate::error::{Error, TransportError};

/// A message received from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Chat the message arrived in (used for replies).
    pub chat_id: i64,
    pub sender: SenderIdentity,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(chat_id: i64, sender: SenderIdentity, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender,
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Stream of inbound messages. Ends when the transport disconnects.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// Result of a code request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SentCode {
    /// Session token that must accompany the code at sign-in.
    pub phone_code_hash: String,
}

/// Result of submitting a login code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    Authorized,
    /// The account has a two-factor password that must be checked next.
    PasswordRequired,
}

/// The logged-in account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl AccountInfo {
    /// `First Last (@username)` as printed after login.
    pub fn describe(&self) -> String {
        format!(
            "{} {} (@{})",
            self.first_name,
            self.last_name.as_deref().unwrap_or(""),
            self.username.as_deref().unwrap_or("no username")
        )
    }
}

/// A chat platform client session.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &str;

    /// Open the connection. Callers bound this with a timeout.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Whether the persisted session is already logged in.
    async fn is_authorized(&self) -> Result<bool, TransportError>;

    /// Ask the platform to deliver a login code to `phone`.
    async fn send_code_request(&self, phone: &str) -> Result<SentCode, TransportError>;

    /// Submit a login code. Rejected codes are `Error::Auth`.
    async fn sign_in(
        &self,
        phone: &str,
        code: &str,
        phone_code_hash: &str,
    ) -> Result<SignInOutcome, Error>;

    /// Submit the two-factor password. A rejected password is `Error::Auth`.
    async fn check_password(&self, password: &SecretString) -> Result<(), Error>;

    /// Fetch the logged-in account.
    async fn get_me(&self) -> Result<AccountInfo, TransportError>;

    /// Start receiving inbound messages.
    async fn messages(&self) -> Result<MessageStream, TransportError>;

    /// Send a text message to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    /// Release the session.
    async fn disconnect(&self) -> Result<(), TransportError>;
}
