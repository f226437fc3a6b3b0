//! The completion abstraction.
//!
//! The relay talks to the model only through this trait, so the HTTP client
//! can be swapped for a scripted one in tests.

use async_trait::async_trait;

use super::types::Turn;
use crate::error::CompletionError;

/// A backend that turns a conversation into a reply.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Model identifier, for logging.
    fn model(&self) -> &str;

    /// Request a reply for `system` followed by `turns`.
    ///
    /// Implementations own their retry policy; the returned error is final.
    /// They must not have side effects on conversation state.
    async fn complete(&self, system: &Turn, turns: &[Turn]) -> Result<String, CompletionError>;
}
