//! Configuration types.
//!
//! Everything comes from environment variables, optionally seeded from a
//! `.env` file by `main`. Tests build configs through [`RelayConfig::from_lookup`]
//! so they never touch the process environment.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::auth::CodeSourcePolicy;
use crate::error::ConfigError;

/// Default chat identity that delivers login codes.
pub const DEFAULT_CODE_CHAT_NUMBER: &str = "42777";

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Application id issued by the chat platform.
    pub api_id: i32,
    /// Application hash issued by the chat platform.
    pub api_hash: SecretString,
    /// Account phone number to log in with.
    pub phone_number: String,
    /// Persisted session identifier.
    pub session_name: String,
    /// Identity that delivers login codes.
    pub code_chat_number: String,
    /// Restrict code extraction to messages from `code_chat_number`.
    pub code_source_strict: bool,
    /// Where extracted codes are forwarded for CI/CD.
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    /// Pre-supplied login code; bypasses chat interception entirely.
    pub login_code: Option<String>,
    /// Two-factor password.
    pub two_fa_password: Option<SecretString>,
    /// How long to wait for the code to arrive in chat.
    pub code_wait_timeout: Duration,
    pub connect_timeout: Duration,
    /// Scratch file for the last captured code.
    pub code_file: Option<PathBuf>,
    /// Port for the HTTP control surface (disabled when `None`).
    pub http_port: Option<u16>,
    /// Re-request poller interval.
    pub poll_interval: Duration,
    /// Base URL of the chat gateway.
    pub gateway_url: String,
    /// Whether a human can be prompted for the code.
    pub interactive: bool,
}

impl RelayConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let api_id = parse_value::<i32>("API_ID", &required("API_ID")?)?;
        let api_hash = SecretString::from(required("API_HASH")?);
        let phone_number = required("PHONE_NUMBER")?;

        let code_source_strict = match get("CODE_SOURCE_STRICT") {
            Some(v) => parse_bool("CODE_SOURCE_STRICT", &v)?,
            None => true,
        };

        let interactive = match get("INTERACTIVE") {
            Some(v) => parse_bool("INTERACTIVE", &v)?,
            None => std::io::stdin().is_terminal(),
        };

        let http_port = get("HTTP_PORT")
            .map(|v| parse_value::<u16>("HTTP_PORT", &v))
            .transpose()?;

        Ok(Self {
            api_id,
            api_hash,
            phone_number,
            session_name: get("SESSION_NAME").unwrap_or_else(|| "session".to_string()),
            code_chat_number: get("CODE_CHAT_NUMBER")
                .unwrap_or_else(|| DEFAULT_CODE_CHAT_NUMBER.to_string()),
            code_source_strict,
            webhook_url: get("WEBHOOK_URL"),
            webhook_timeout: secs_or(&get, "WEBHOOK_TIMEOUT_SECS", 10)?,
            login_code: get("LOGIN_CODE").map(|c| c.trim().to_string()),
            two_fa_password: get("TWO_FA_PASSWORD").map(SecretString::from),
            code_wait_timeout: secs_or(&get, "CODE_WAIT_TIMEOUT_SECS", 300)?,
            connect_timeout: secs_or(&get, "CONNECT_TIMEOUT_SECS", 30)?,
            code_file: get("CODE_FILE").map(PathBuf::from),
            http_port,
            poll_interval: poll_interval(&get)?,
            gateway_url: get("GATEWAY_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8081".to_string())
                .trim_end_matches('/')
                .to_string(),
            interactive,
        })
    }

    /// Sender policy for login-code messages.
    pub fn code_source_policy(&self) -> CodeSourcePolicy {
        if self.code_source_strict {
            CodeSourcePolicy::Scoped(self.code_chat_number.clone())
        } else {
            CodeSourcePolicy::AnySender
        }
    }

    /// Tag sent as `source` in webhook payloads.
    pub fn webhook_source(&self) -> String {
        format!("telegram_chat_{}", self.code_chat_number)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?} is not a boolean"),
        }),
    }
}

fn secs_or<G>(get: &G, key: &str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => Ok(Duration::from_secs(parse_value(key, &v)?)),
        None => Ok(Duration::from_secs(default)),
    }
}

/// `POLL_INTERVAL_MS`; zero is rejected since the poller ticks on it.
fn poll_interval<G>(get: &G) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(v) = get("POLL_INTERVAL_MS") else {
        return Ok(Duration::from_secs(1));
    };
    match parse_value::<u64>("POLL_INTERVAL_MS", &v)? {
        0 => Err(ConfigError::InvalidValue {
            key: "POLL_INTERVAL_MS".to_string(),
            message: "must be greater than zero".to_string(),
        }),
        ms => Ok(Duration::from_millis(ms)),
    }
}
