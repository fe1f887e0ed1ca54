//! Shared fixtures: a scripted chat transport and config helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;

use code_relay::auth::SenderIdentity;
use code_relay::channels::{
    AccountInfo, ChatTransport, InboundMessage, MessageStream, SentCode, SignInOutcome,
};
use code_relay::config::RelayConfig;
use code_relay::error::{AuthError, Error, TransportError};

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const PHONE: &str = "+15550001111";

/// How the scripted platform answers a sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInScript {
    Accept,
    RequirePassword,
    RejectCode,
}

/// In-memory stand-in for the chat platform.
pub struct ScriptedTransport {
    authorized: AtomicBool,
    sign_in: Mutex<SignInScript>,
    password: Option<String>,
    connect_delay: Option<Duration>,
    /// Delivered to the inbound stream after each code request.
    code_message: Mutex<Option<InboundMessage>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    pub code_requests: AtomicUsize,
    pub disconnects: AtomicUsize,
    /// `(code, phone_code_hash)` per sign-in attempt.
    pub sign_ins: Mutex<Vec<(String, String)>>,
    pub passwords: Mutex<Vec<String>>,
    /// `(chat_id, text)` per outgoing message.
    pub sent: Mutex<Vec<(i64, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            authorized: AtomicBool::new(false),
            sign_in: Mutex::new(SignInScript::Accept),
            password: None,
            connect_delay: None,
            code_message: Mutex::new(None),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: Mutex::new(Some(rx)),
            code_requests: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            sign_ins: Mutex::new(Vec::new()),
            passwords: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn already_authorized(self) -> Self {
        self.authorized.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_sign_in(self, script: SignInScript) -> Self {
        *self.sign_in.lock().unwrap() = script;
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// The platform answers every code request with this chat message.
    pub fn delivers_on_request(self, msg: InboundMessage) -> Self {
        *self.code_message.lock().unwrap() = Some(msg);
        self
    }

    /// Push a message into the inbound stream.
    pub fn deliver(&self, msg: InboundMessage) {
        if let Some(tx) = self.inbound_tx.lock().unwrap().as_ref() {
            let _ = tx.send(msg);
        }
    }

    /// End the inbound stream, as a dropped connection would.
    pub fn close_inbound(&self) {
        self.inbound_tx.lock().unwrap().take();
    }

    pub fn requests(&self) -> usize {
        self.code_requests.load(Ordering::SeqCst)
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, TransportError> {
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    async fn send_code_request(&self, _phone: &str) -> Result<SentCode, TransportError> {
        let n = self.code_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = self.code_message.lock().unwrap().clone();
        if let Some(msg) = pending {
            self.deliver(msg);
        }
        Ok(SentCode {
            phone_code_hash: format!("hash-{n}"),
        })
    }

    async fn sign_in(
        &self,
        _phone: &str,
        code: &str,
        phone_code_hash: &str,
    ) -> Result<SignInOutcome, Error> {
        self.sign_ins
            .lock()
            .unwrap()
            .push((code.to_string(), phone_code_hash.to_string()));

        let script = *self.sign_in.lock().unwrap();
        match script {
            SignInScript::Accept => {
                self.authorized.store(true, Ordering::SeqCst);
                Ok(SignInOutcome::Authorized)
            }
            SignInScript::RequirePassword => Ok(SignInOutcome::PasswordRequired),
            SignInScript::RejectCode => Err(AuthError::InvalidCode {
                reason: "PHONE_CODE_INVALID".into(),
            }
            .into()),
        }
    }

    async fn check_password(&self, password: &SecretString) -> Result<(), Error> {
        let given = password.expose_secret().to_string();
        self.passwords.lock().unwrap().push(given.clone());
        if self.password.as_deref() == Some(given.as_str()) {
            self.authorized.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(AuthError::InvalidPassword {
                reason: "PASSWORD_HASH_INVALID".into(),
            }
            .into())
        }
    }

    async fn get_me(&self) -> Result<AccountInfo, TransportError> {
        Ok(AccountInfo {
            first_name: "Test".into(),
            last_name: None,
            username: Some("relay_test".into()),
        })
    }

    async fn messages(&self) -> Result<MessageStream, TransportError> {
        let rx = self
            .inbound_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(TransportError::Disconnected)?;

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The official code source: service account 777000 reached via 42777.
pub fn code_source() -> SenderIdentity {
    SenderIdentity::with_id(777000).with_phone("42777")
}

pub fn code_message(text: &str) -> InboundMessage {
    InboundMessage::new(777000, code_source(), text)
}

/// Config with the required keys plus `extra` overrides.
pub fn config(extra: &[(&str, &str)]) -> RelayConfig {
    let mut map: HashMap<String, String> = [
        ("API_ID", "12345"),
        ("API_HASH", "abcdef"),
        ("PHONE_NUMBER", PHONE),
        ("INTERACTIVE", "false"),
        ("CODE_WAIT_TIMEOUT_SECS", "5"),
        ("CONNECT_TIMEOUT_SECS", "5"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        map.insert(k.to_string(), v.to_string());
    }
    RelayConfig::from_lookup(move |key| map.get(key).cloned()).expect("valid test config")
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
