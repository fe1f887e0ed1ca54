//! Error types for the code relay.

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Control server error: {0}")]
    Server(#[from] ServerError),
}

/// Control HTTP server startup errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener setup failed: {0}")]
    Listener(#[source] std::io::Error),

    #[error("Could not start server thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connect timed out after {timeout:?}")]
    ConnectTimeout { timeout: Duration },

    #[error("Request {method} timed out")]
    RequestTimeout { method: String },

    #[error("Request {method} failed: {reason}")]
    RequestFailed { method: String, reason: String },

    #[error("Invalid response from {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("Transport disconnected")]
    Disconnected,
}

impl TransportError {
    /// Classify a `reqwest` failure for the given gateway method.
    pub fn from_reqwest(method: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::RequestTimeout {
                method: method.to_string(),
            }
        } else if e.is_decode() {
            Self::InvalidResponse {
                method: method.to_string(),
                reason: e.to_string(),
            }
        } else {
            Self::RequestFailed {
                method: method.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Sign-in errors. These abort the attempt and disconnect cleanly.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No code request is outstanding (missing phone_code_hash)")]
    NoCodeRequested,

    #[error("Login code was not received and manual entry is unavailable")]
    CodeUnavailable,

    #[error("Login code was rejected: {reason}")]
    InvalidCode { reason: String },

    #[error("Two-factor password required but TWO_FA_PASSWORD is not set")]
    PasswordRequired,

    #[error("Two-factor password was rejected: {reason}")]
    InvalidPassword { reason: String },
}

/// Why a webhook delivery did not succeed. Logged, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Timeout while sending code to webhook")]
    Timeout,

    #[error("Could not reach webhook: {0}")]
    Connect(String),

    #[error("Webhook returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Error sending code to webhook: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for WebhookError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Unexpected(e.to_string())
        }
    }
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
