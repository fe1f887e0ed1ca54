//! Login waiter: drives the session from connect to authorized.
//!
//! ```text
//! Connecting → CheckingAuth ─┬─────────────────────────────────────→ Authorized
//!                            └→ NeedsCode → AwaitingCode → SigningIn ─┬→ Authorized
//!                                                                     └→ NeedsPassword → Authorized
//! ```
//!
//! Any error moves to `Failed` and disconnects the transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::auth::extract::is_valid_code;
use crate::channels::{ChatTransport, SentCode, SignInOutcome};
use crate::config::RelayConfig;
use crate::context::RelayContext;
use crate::error::{AuthError, Error, Result, TransportError};

/// Where the authentication flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Connecting,
    CheckingAuth,
    NeedsCode,
    AwaitingCode,
    SigningIn,
    NeedsPassword,
    Authorized,
    Failed,
}

/// How the login code was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOrigin {
    /// `LOGIN_CODE` was set.
    Environment,
    /// Intercepted from chat through the rendezvous.
    Chat,
    /// Typed in by an operator after the chat wait timed out.
    Manual,
}

/// How the waiter reached `Authorized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The persisted session was still valid.
    AlreadyAuthorized,
    SignedIn { origin: CodeOrigin, two_factor: bool },
}

/// Knobs for one login attempt.
#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub phone_number: String,
    /// Used in log lines only.
    pub code_chat_number: String,
    pub login_code: Option<String>,
    pub two_fa_password: Option<SecretString>,
    pub connect_timeout: Duration,
    pub code_wait_timeout: Duration,
    pub interactive: bool,
}

impl From<&RelayConfig> for LoginSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            phone_number: config.phone_number.clone(),
            code_chat_number: config.code_chat_number.clone(),
            login_code: config.login_code.clone(),
            two_fa_password: config.two_fa_password.clone(),
            connect_timeout: config.connect_timeout,
            code_wait_timeout: config.code_wait_timeout,
            interactive: config.interactive,
        }
    }
}

/// Asks a human for the login code.
#[async_trait]
pub trait CodePrompt: Send + Sync {
    /// `None` when no code was entered.
    async fn prompt(&self, phone_number: &str) -> Option<String>;
}

/// Reads the code from stdin.
pub struct StdinPrompt;

#[async_trait]
impl CodePrompt for StdinPrompt {
    async fn prompt(&self, phone_number: &str) -> Option<String> {
        eprint!("Enter the login code sent to {phone_number}: ");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => Some(line.trim().to_string()).filter(|c| !c.is_empty()),
            Ok(None) => None,
            Err(e) => {
                error!("Error reading stdin: {e}");
                None
            }
        }
    }
}

/// Request a fresh login code and record its session token.
pub async fn request_code(
    transport: &dyn ChatTransport,
    ctx: &RelayContext,
    phone_number: &str,
) -> std::result::Result<SentCode, TransportError> {
    let sent = transport.send_code_request(phone_number).await?;
    ctx.set_session_token(sent.phone_code_hash.clone());
    info!("Code sent to number {phone_number}");
    Ok(sent)
}

/// Consumer side of the code handoff.
pub struct LoginWaiter {
    transport: Arc<dyn ChatTransport>,
    ctx: Arc<RelayContext>,
    settings: LoginSettings,
    prompt: Option<Arc<dyn CodePrompt>>,
    state: Mutex<LoginState>,
}

impl LoginWaiter {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        ctx: Arc<RelayContext>,
        settings: LoginSettings,
    ) -> Self {
        Self {
            transport,
            ctx,
            settings,
            prompt: None,
            state: Mutex::new(LoginState::Connecting),
        }
    }

    /// Operator prompt used when the chat wait times out.
    pub fn with_prompt(mut self, prompt: Arc<dyn CodePrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn state(&self) -> LoginState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, state: LoginState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        tracing::debug!(?state, "Login state");
    }

    /// Open the transport, bounded by the connect timeout.
    pub async fn connect(&self) -> Result<()> {
        self.guard(async {
            self.open().await?;
            Ok(())
        })
        .await
    }

    /// Take an open transport from `CheckingAuth` to `Authorized`.
    pub async fn authorize(&self) -> Result<LoginOutcome> {
        self.guard(self.sign_in_flow()).await
    }

    /// Connect and authorize.
    pub async fn run(&self) -> Result<LoginOutcome> {
        self.guard(async {
            self.open().await?;
            self.sign_in_flow().await
        })
        .await
    }

    /// On failure: enter `Failed`, log, and release the transport.
    async fn guard<T>(&self, step: impl Future<Output = Result<T>>) -> Result<T> {
        match step.await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.enter(LoginState::Failed);
                error!("❌ Authorization error: {e}");
                if let Err(de) = self.transport.disconnect().await {
                    warn!("Disconnect after failed login also failed: {de}");
                }
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<()> {
        self.enter(LoginState::Connecting);
        info!("Connecting to {}...", self.transport.name());

        let timeout = self.settings.connect_timeout;
        tokio::time::timeout(timeout, self.transport.connect())
            .await
            .map_err(|_| TransportError::ConnectTimeout { timeout })??;
        Ok(())
    }

    async fn sign_in_flow(&self) -> Result<LoginOutcome> {
        self.enter(LoginState::CheckingAuth);
        if self.transport.is_authorized().await? {
            info!("✅ Already authorized!");
            self.enter(LoginState::Authorized);
            return Ok(LoginOutcome::AlreadyAuthorized);
        }

        self.enter(LoginState::NeedsCode);
        info!(
            "Authorization required. Waiting for code from chat {}...",
            self.settings.code_chat_number
        );
        request_code(
            self.transport.as_ref(),
            &self.ctx,
            &self.settings.phone_number,
        )
        .await?;

        self.enter(LoginState::AwaitingCode);
        let (code, origin) = self.obtain_code().await?;

        self.enter(LoginState::SigningIn);
        // Read at submit time: the poller may have re-requested meanwhile.
        let phone_code_hash = self.ctx.session_token().ok_or(AuthError::NoCodeRequested)?;
        let outcome = self
            .transport
            .sign_in(&self.settings.phone_number, &code, &phone_code_hash)
            .await?;

        let two_factor = outcome == SignInOutcome::PasswordRequired;
        if two_factor {
            self.enter(LoginState::NeedsPassword);
            info!("Two-factor password required");
            let password = self
                .settings
                .two_fa_password
                .as_ref()
                .ok_or(AuthError::PasswordRequired)?;
            self.transport.check_password(password).await?;
        }

        info!("✅ Successfully authorized!");
        self.enter(LoginState::Authorized);
        Ok(LoginOutcome::SignedIn { origin, two_factor })
    }

    /// Environment code first, then the chat handoff, then a human.
    async fn obtain_code(&self) -> Result<(String, CodeOrigin)> {
        if let Some(ref code) = self.settings.login_code {
            info!("Using LOGIN_CODE from environment");
            if !is_valid_code(code) {
                warn!("⚠️ LOGIN_CODE does not look like a 5-digit code, submitting anyway");
            }
            return Ok((code.clone(), CodeOrigin::Environment));
        }

        info!(
            "Waiting for code from chat {}...",
            self.settings.code_chat_number
        );
        if let Some(code) = self
            .ctx
            .rendezvous
            .await_code(self.settings.code_wait_timeout)
            .await
        {
            return Ok((code, CodeOrigin::Chat));
        }

        warn!(
            "⏱️ Timeout waiting for code from chat {}",
            self.settings.code_chat_number
        );

        if !self.settings.interactive {
            return Err(Error::Auth(AuthError::CodeUnavailable));
        }

        let Some(ref prompt) = self.prompt else {
            return Err(Error::Auth(AuthError::CodeUnavailable));
        };

        match prompt.prompt(&self.settings.phone_number).await {
            Some(code) => Ok((code, CodeOrigin::Manual)),
            None => Err(Error::Auth(AuthError::CodeUnavailable)),
        }
    }
}
