//! The relay service
//!
//! Owns every piece of process-wide state (conversation windows, usage ledger,
//! rate gate) and turns one inbound chat message into at most one reply.
//!
//! History is only mutated after the completion call has definitively
//! succeeded. A failed or timed-out request leaves the channel's window exactly
//! as it was after idle expiry, with no half-committed user turn.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, API_KEY_ENV};
use crate::error::{CompletionError, RelayError, RelayResult};
use crate::llm::openai::CompletionClient;
use crate::llm::provider::CompletionProvider;
use crate::llm::tokens::TokenEstimator;
use crate::llm::types::Turn;
use crate::rate::RateGate;
use crate::session::{SessionPolicy, SessionStore};
use crate::usage::{Budget, UsageLedger};

/// Command that clears a channel's history
pub const RESET_COMMAND: &str = "/reset";

const RESET_DONE: &str = "Chat history has been reset.";
const RESET_DENIED: &str = "You are not authorized to reset the chat history.";

/// Target for the chat transcript log
const CHAT_LOG_TARGET: &str = "relaybot::chat";

/// A message delivered by the chat platform.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub channel_id: String,
    pub content: String,
}

/// Outbound half of the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send(&self, channel_id: &str, text: &str) -> anyhow::Result<()>;
}

/// What happened to an inbound message that was not rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The model replied; `tokens` were charged to the daily budget
    Replied { reply: String, tokens: u64 },
    /// The bot is switched off and answered with its notice
    Disabled,
    Reset,
    ResetDenied,
}

/// Top-level context object shared by every channel handler.
pub struct RelayService {
    config: Config,
    sessions: SessionStore,
    ledger: UsageLedger,
    gate: RateGate,
    estimator: TokenEstimator,
    provider: Arc<dyn CompletionProvider>,
}

impl RelayService {
    pub fn new(
        config: Config,
        provider: Arc<dyn CompletionProvider>,
        ledger: UsageLedger,
    ) -> RelayResult<Self> {
        config.validate()?;

        let estimator = TokenEstimator::new();
        Ok(Self {
            sessions: SessionStore::new(SessionPolicy::from_config(&config), estimator),
            gate: RateGate::per_minute(config.limits.requests_per_minute),
            ledger,
            estimator,
            provider,
            config,
        })
    }

    /// Build the service with the HTTP completion client and the on-disk ledger.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        let api_key = std::env::var(API_KEY_ENV)
            .with_context(|| format!("{} environment variable not set", API_KEY_ENV))?;
        let client = CompletionClient::from_config(&config, api_key)?;
        let ledger = UsageLedger::open(config.usage_file()?);

        info!(model = %config.completion.model, "Relay service ready");
        Ok(Self::new(config, Arc::new(client), ledger)?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Handle one inbound message and send whatever the user should see.
    ///
    /// Every failure is logged and converted into its user-facing notice here;
    /// the result is returned for callers that want to inspect it.
    pub async fn handle_message(
        &self,
        msg: &InboundMessage,
        platform: &dyn ChatPlatform,
    ) -> RelayResult<Outcome> {
        self.handle_message_at(msg, platform, Utc::now()).await
    }

    pub async fn handle_message_at(
        &self,
        msg: &InboundMessage,
        platform: &dyn ChatPlatform,
        now: DateTime<Utc>,
    ) -> RelayResult<Outcome> {
        info!(channel = %msg.channel_id, sender = %msg.sender_name, "Received message");
        self.chat_log(&msg.channel_id, &msg.sender_name, &msg.content);

        let result = self.process(msg, now).await;

        match &result {
            Ok(Outcome::Replied { reply, tokens }) => {
                debug!(channel = %msg.channel_id, tokens, "Relaying reply");
                self.chat_log(&msg.channel_id, "bot", reply);
                self.deliver(platform, &msg.channel_id, reply).await;
            }
            Ok(Outcome::Disabled) => {
                self.deliver(platform, &msg.channel_id, &self.config.bot.disabled_message)
                    .await;
            }
            Ok(Outcome::Reset) => self.deliver(platform, &msg.channel_id, RESET_DONE).await,
            Ok(Outcome::ResetDenied) => {
                warn!(channel = %msg.channel_id, sender = %msg.sender_id, "Unauthorized reset attempt");
                self.deliver(platform, &msg.channel_id, RESET_DENIED).await;
            }
            Err(e) => {
                match e {
                    RelayError::EmptyContent => {
                        info!(channel = %msg.channel_id, sender = %msg.sender_name, "Skipped empty message")
                    }
                    RelayError::RateLimited | RelayError::BudgetExceeded { .. } => {
                        warn!(channel = %msg.channel_id, error = %e, "Request refused")
                    }
                    _ => error!(channel = %msg.channel_id, error = ?e, "Error during message processing"),
                }
                if let Some(text) = e.user_message() {
                    self.deliver(platform, &msg.channel_id, text).await;
                }
            }
        }

        result
    }

    /// Run the admission checks and the completion exchange for one message.
    ///
    /// Sends nothing to the platform.
    pub async fn process(&self, msg: &InboundMessage, now: DateTime<Utc>) -> RelayResult<Outcome> {
        if self.config.bot.disabled {
            return Ok(Outcome::Disabled);
        }

        let text = msg.content.trim();
        if self.config.bot.reset_command_enabled && text == RESET_COMMAND {
            return Ok(self.reset(msg).await);
        }
        if text.is_empty() {
            return Err(RelayError::EmptyContent);
        }

        self.sessions.evict_idle(now).await;

        if !self.gate.admit() {
            return Err(RelayError::RateLimited);
        }

        let shared = self.sessions.get_or_create(&msg.channel_id, now).await;
        let mut window = shared.lock().await;
        self.sessions.on_inbound(&mut window, now);

        let today = now.date_naive();
        let user_cost = self.estimator.estimate(&msg.content);
        let budget = self
            .ledger
            .remaining_budget_on(self.config.limits.daily_token_cap, today);
        debug!(user_cost, %budget, "Checked daily token budget");
        if !budget.allows(user_cost) {
            let remaining = match budget {
                Budget::Remaining(left) => left,
                Budget::Unlimited => u64::MAX,
            };
            return Err(RelayError::BudgetExceeded {
                needed: user_cost,
                remaining,
            });
        }

        let user_turn = Turn::user(format!("[{}] {}", timestamp(now), msg.content))
            .ok_or(RelayError::EmptyContent)?;
        let mut turns = self.sessions.candidate_turns(&window, user_turn);
        let system = self.system_turn(now)?;

        let reply = self.provider.complete(&system, &turns).await?;
        let reply_turn = Turn::assistant(reply.as_str())
            .ok_or_else(|| CompletionError::Protocol("empty reply".into()))?;

        turns.push(reply_turn);
        window.commit(turns, now);

        let tokens = user_cost + self.estimator.estimate(&reply);
        let counter = self.ledger.record_on(tokens, today);
        info!(channel = %msg.channel_id, tokens, total = counter.usage, "Completion succeeded");

        Ok(Outcome::Replied { reply, tokens })
    }

    async fn reset(&self, msg: &InboundMessage) -> Outcome {
        if self.config.bot.admin_only_reset && !self.config.is_admin(&msg.sender_id) {
            return Outcome::ResetDenied;
        }
        self.sessions.reset(&msg.channel_id).await;
        Outcome::Reset
    }

    /// The per-request system turn. Never stored in a window.
    fn system_turn(&self, now: DateTime<Utc>) -> RelayResult<Turn> {
        let content = format!(
            "System time+date: {}, {}: {}",
            timestamp(now),
            now.format("%A"),
            self.config.bot.system_instructions
        );
        Turn::system(content).ok_or_else(|| anyhow::anyhow!("system turn is empty").into())
    }

    async fn deliver(&self, platform: &dyn ChatPlatform, channel_id: &str, text: &str) {
        for chunk in split_message(text, self.config.bot.max_message_chars) {
            if let Err(e) = platform.send(channel_id, &chunk).await {
                error!(channel = channel_id, error = ?e, "Failed to send message");
                return;
            }
        }
    }

    fn chat_log(&self, channel_id: &str, author: &str, text: &str) {
        if self.config.logging.chat_log {
            info!(target: CHAT_LOG_TARGET, channel = channel_id, author, "{}", text);
        }
    }
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Prefers breaking at the last newline within the limit; that newline is
/// dropped, so joining such chunks with `\n` gives back the original text.
/// Without a newline the text is cut at the limit and nothing is dropped. Cuts
/// always fall on char boundaries. Whitespace-only chunks are skipped since
/// chat platforms refuse blank messages.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let limit = match rest.char_indices().nth(max_chars) {
            Some((idx, _)) => idx,
            None => {
                push_chunk(&mut chunks, rest);
                break;
            }
        };

        let (piece, cut) = match rest[..limit].rfind('\n') {
            Some(pos) if pos > 0 => (&rest[..pos], pos + 1),
            _ => (&rest[..limit], limit),
        };
        push_chunk(&mut chunks, piece);
        rest = &rest[cut..];
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    if !chunk.trim().is_empty() {
        chunks.push(chunk.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_message() {
        assert_eq!(split_message("hello", 4096), vec!["hello"]);
        assert!(split_message("", 4096).is_empty());
    }

    #[test]
    fn test_split_prefers_newlines() {
        let text = "first line\nsecond line\nthird";
        let chunks = split_message(text, 15);
        assert_eq!(chunks, vec!["first line", "second line", "third"]);
    }

    #[test]
    fn test_split_keeps_code_block_intact() {
        let text = "```\nfn main() {\n    go();\n}\n```";
        let chunks = split_message(text, 16);
        assert_eq!(chunks, vec!["```\nfn main() {", "    go();\n}\n```"]);
        assert_eq!(chunks.join("\n"), text);

        // Only the newline at the cut is dropped; blank lines survive.
        let chunks = split_message("ab\n\ncd", 4);
        assert_eq!(chunks, vec!["ab\n", "cd"]);
        assert_eq!(chunks.join("\n"), "ab\n\ncd");
    }

    #[test]
    fn test_split_hard_cut_without_newlines() {
        let text = "a".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "ä".repeat(9);
        let chunks = split_message(&text, 4);
        assert_eq!(chunks, vec!["ää".repeat(2), "ää".repeat(2), "ä".to_string()]);
    }

    #[test]
    fn test_split_default_platform_limit() {
        let text = "x".repeat(4096 * 2 + 1);
        let chunks = split_message(&text, 4096);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "x");
    }
}
