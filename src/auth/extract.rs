//! Login-code extraction policy.
//!
//! The labelled form (`Login code: 40353`) wins; otherwise the first
//! standalone five-digit number in the text is taken.

use std::sync::LazyLock;

use regex::Regex;

/// Number of digits in a login code.
pub const CODE_LENGTH: usize = 5;

static LABELLED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Login code:\s*(\d{5})").unwrap());

static BARE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}\b").unwrap());

/// Which rule produced a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// `Login code:` label followed by the digits.
    Labelled,
    /// Any word-bounded five-digit number.
    Fallback,
}

/// A code pulled out of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCode {
    pub code: String,
    pub kind: MatchKind,
}

/// Extract a login code from message text, if it carries one.
pub fn extract_code(text: &str) -> Option<ExtractedCode> {
    if let Some(caps) = LABELLED_CODE.captures(text) {
        return Some(ExtractedCode {
            code: caps[1].to_string(),
            kind: MatchKind::Labelled,
        });
    }

    BARE_CODE.find(text).map(|m| ExtractedCode {
        code: m.as_str().to_string(),
        kind: MatchKind::Fallback,
    })
}

/// Whether `code` looks like a login code (exactly five ASCII digits).
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}
