//! relaybot: relays chat messages to a completion API
//!
//! Keeps a bounded conversation window per channel, enforces a global request
//! rate and a daily token budget, and retries timed-out completion calls
//! without corrupting history.

pub mod config;
pub mod error;
pub mod llm;
pub mod rate;
pub mod relay;
pub mod session;
pub mod usage;

pub use config::Config;
pub use error::{CompletionError, CompletionErrorKind, RelayError, RelayResult};
pub use llm::{CompletionClient, CompletionProvider, RetryPolicy, Role, TokenEstimator, Turn};
pub use rate::RateGate;
pub use relay::{split_message, ChatPlatform, InboundMessage, Outcome, RelayService};
pub use session::{ConversationWindow, SessionPolicy, SessionStore};
pub use usage::{Budget, UsageCounter, UsageLedger};
