//! Inbox filter: spots login codes in inbound chat messages.
//!
//! Classification is pure ([`InboxFilter::classify`]); [`InboxFilter::handle`]
//! then publishes the code and runs the best-effort side effects (webhook,
//! scratch file). Neither side effect can undo a capture.

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::extract::{ExtractedCode, MatchKind, extract_code};
use crate::auth::sender::CodeSourcePolicy;
use crate::channels::InboundMessage;
use crate::context::RelayContext;
use crate::scratch::CodeScratchFile;
use crate::webhook::WebhookDispatcher;

/// What the filter decided about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxOutcome {
    Captured(ExtractedCode),
    /// Sender is not a trusted code source.
    IgnoredSender,
    NoCode,
}

/// Classifies inbound messages and publishes extracted codes.
pub struct InboxFilter {
    policy: CodeSourcePolicy,
    ctx: Arc<RelayContext>,
    webhook: Arc<WebhookDispatcher>,
    scratch: Option<CodeScratchFile>,
}

impl InboxFilter {
    pub fn new(
        policy: CodeSourcePolicy,
        ctx: Arc<RelayContext>,
        webhook: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            policy,
            ctx,
            webhook,
            scratch: None,
        }
    }

    pub fn with_scratch_file(mut self, scratch: CodeScratchFile) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Decide whether `msg` carries a login code, without side effects.
    pub fn classify(&self, msg: &InboundMessage) -> InboxOutcome {
        if !self.policy.allows(&msg.sender) {
            return InboxOutcome::IgnoredSender;
        }

        match extract_code(&msg.text) {
            Some(extracted) => InboxOutcome::Captured(extracted),
            None => InboxOutcome::NoCode,
        }
    }

    /// Classify `msg` and, on a match, publish the code and forward it.
    pub async fn handle(&self, msg: &InboundMessage) -> InboxOutcome {
        let outcome = self.classify(msg);

        let InboxOutcome::Captured(ref extracted) = outcome else {
            debug!(sender = %msg.sender.display(), ?outcome, "Message carries no login code");
            return outcome;
        };

        let code = extracted.code.as_str();
        self.ctx.capture(code);
        info!(
            sender = %msg.sender.display(),
            fallback = extracted.kind == MatchKind::Fallback,
            "✅ Code received from chat: {code}"
        );

        self.webhook.dispatch(code, &msg.text).await;

        if let Some(ref scratch) = self.scratch {
            scratch.store(code).await;
        }

        outcome
    }
}
