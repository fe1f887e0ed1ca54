//! Login-code interception: extraction, handoff, and the sign-in flow.

pub mod extract;
pub mod inbox;
pub mod poller;
pub mod rendezvous;
pub mod sender;
pub mod waiter;

pub use extract::{ExtractedCode, MatchKind, extract_code};
pub use inbox::{InboxFilter, InboxOutcome};
pub use poller::spawn_request_poller;
pub use rendezvous::CodeRendezvous;
pub use sender::{CodeSourcePolicy, SenderIdentity};
pub use waiter::{CodeOrigin, CodePrompt, LoginOutcome, LoginSettings, LoginState, LoginWaiter, StdinPrompt};
