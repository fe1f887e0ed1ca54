//! Sender identity and the policy deciding who may deliver login codes.

use serde::{Deserialize, Serialize};

/// Normalized identity of a message sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl SenderIdentity {
    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Numeric id as text.
    pub fn id_str(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    /// Username without a leading `@`.
    pub fn username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(|u| u.trim_start_matches('@'))
            .filter(|u| !u.is_empty())
    }

    /// Phone number reduced to its digits.
    pub fn phone_digits(&self) -> Option<String> {
        self.phone
            .as_deref()
            .map(|p| p.chars().filter(char::is_ascii_digit).collect::<String>())
            .filter(|p| !p.is_empty())
    }

    /// Human-readable label for logs.
    pub fn display(&self) -> String {
        if let Some(username) = self.username() {
            format!("@{username}")
        } else if let Some(id) = self.id {
            id.to_string()
        } else if let Some(ref phone) = self.phone {
            phone.clone()
        } else {
            "unknown".to_string()
        }
    }
}

/// Which senders are trusted to deliver login codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeSourcePolicy {
    /// Only senders whose id, username, or phone contains the identifier.
    Scoped(String),
    /// Any sender; matching relies on the text pattern alone.
    AnySender,
}

impl CodeSourcePolicy {
    /// Whether `sender` may deliver a login code under this policy.
    pub fn allows(&self, sender: &SenderIdentity) -> bool {
        match self {
            Self::AnySender => true,
            Self::Scoped(source) => sender_matches_source(sender, source),
        }
    }
}

/// Containment match of a code-source identifier against every identity field.
pub fn sender_matches_source(sender: &SenderIdentity, source: &str) -> bool {
    let source = source.trim().trim_start_matches('@');
    if source.is_empty() {
        return false;
    }

    let source_digits = source.trim_start_matches('+');
    let numeric_source =
        !source_digits.is_empty() && source_digits.chars().all(|c| c.is_ascii_digit());

    if let Some(id) = sender.id_str() {
        if id.contains(source) {
            return true;
        }
    }

    if let Some(username) = sender.username() {
        if username.to_lowercase().contains(&source.to_lowercase()) {
            return true;
        }
    }

    if numeric_source {
        if let Some(phone) = sender.phone_digits() {
            if phone.contains(source_digits) {
                return true;
            }
        }
    }

    false
}
