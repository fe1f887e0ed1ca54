//! Canned replies to a couple of chat commands.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::transport::{ChatTransport, InboundMessage};

pub const GREETING_REPLY: &str = "Hello! I am a code relay bot!";
pub const START_REPLY: &str = "Bot is running and ready to work!";

static GREETING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)hello|hi").unwrap());
static START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)/start").unwrap());

/// Replies owed to `text`, in registration order. A message can trigger both.
pub fn replies_for(text: &str) -> Vec<&'static str> {
    let mut replies = Vec::new();
    if GREETING.is_match(text) {
        replies.push(GREETING_REPLY);
    }
    if START.is_match(text) {
        replies.push(START_REPLY);
    }
    replies
}

/// Send any canned replies for `msg`. Failures are logged and swallowed.
pub async fn respond(transport: &dyn ChatTransport, msg: &InboundMessage) {
    for reply in replies_for(&msg.text) {
        if let Err(e) = transport.send_message(msg.chat_id, reply).await {
            tracing::warn!(chat_id = msg.chat_id, "⚠️ Failed to send reply: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_matches_case_insensitive() {
        assert_eq!(replies_for("Hello there"), vec![GREETING_REPLY]);
        assert_eq!(replies_for("HI"), vec![GREETING_REPLY]);
    }

    #[test]
    fn start_command() {
        assert_eq!(replies_for("/START"), vec![START_REPLY]);
    }

    #[test]
    fn greeting_matches_anywhere_in_text() {
        // Patterns are unanchored.
        assert_eq!(replies_for("this"), vec![GREETING_REPLY]);
    }

    #[test]
    fn both_can_fire() {
        assert_eq!(replies_for("hi /start"), vec![GREETING_REPLY, START_REPLY]);
    }

    #[test]
    fn login_code_gets_no_reply() {
        assert!(replies_for("Login code: 40353").is_empty());
    }
}
