//! Per-channel conversation windows
//!
//! Each channel owns an ordered, bounded window of turns. Windows are trimmed
//! in two ways:
//! - on an inbound message after a long idle gap (keep the last N turns, or clear)
//! - before every outbound request, to fit the token ceiling
//!
//! Every window sits behind its own async mutex. Holding that lock for the
//! whole request keeps turns within one channel in strict arrival order while
//! other channels proceed independently.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::llm::tokens::TokenEstimator;
use crate::llm::types::{Role, Turn};

/// A channel's window, shared between the store and the handler working on it.
pub type SharedWindow = Arc<Mutex<ConversationWindow>>;

/// Ordered turns for one channel plus the time it was last active.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    turns: Vec<Turn>,
    last_activity: DateTime<Utc>,
}

impl ConversationWindow {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            turns: Vec::new(),
            last_activity: now,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    /// Append a turn. Empty or whitespace-only content is skipped.
    pub fn push(&mut self, role: Role, content: &str, now: DateTime<Utc>) -> bool {
        match Turn::new(role, content) {
            Some(turn) => {
                self.turns.push(turn);
                self.last_activity = now;
                true
            }
            None => {
                info!(role = role.as_str(), "Skipped appending a turn with empty content");
                false
            }
        }
    }

    /// Replace the stored turns with a committed exchange.
    pub fn commit(&mut self, turns: Vec<Turn>, now: DateTime<Utc>) {
        self.turns = turns;
        self.last_activity = now;
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Apply the idle-expiry policy. Returns true if the window was trimmed.
    ///
    /// `timeout = None` disables expiry. Once idle longer than `timeout`, the
    /// window keeps only its last `max_retained` turns (0 clears it).
    pub fn expire_idle(
        &mut self,
        now: DateTime<Utc>,
        timeout: Option<Duration>,
        max_retained: usize,
    ) -> bool {
        let Some(timeout) = timeout else {
            return false;
        };
        if now - self.last_activity <= timeout {
            return false;
        }

        let before = self.turns.len();
        if max_retained == 0 {
            self.turns.clear();
        } else if before > max_retained {
            self.turns.drain(..before - max_retained);
        }
        info!(before, after = self.turns.len(), "Session timed out, trimmed history");
        true
    }
}

/// Drop the oldest turns until the estimated total fits `max_tokens`.
///
/// Never trims below one turn. Returns the number of turns dropped.
pub fn fit_to_budget(turns: &mut Vec<Turn>, estimator: &TokenEstimator, max_tokens: u64) -> usize {
    let mut total = estimator.estimate_all(turns.iter().map(|t| t.content()));
    let mut dropped = 0;

    while total > max_tokens && turns.len() - dropped > 1 {
        total -= estimator.estimate(turns[dropped].content());
        dropped += 1;
    }

    if dropped > 0 {
        turns.drain(..dropped);
        debug!(dropped, remaining_tokens = total, "Trimmed history to token budget");
    }
    dropped
}

/// Window lifecycle settings.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub timeout: Option<Duration>,
    pub max_retained: usize,
    pub max_tokens: u64,
    pub evict_after: Option<Duration>,
}

impl SessionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.session_timeout(),
            max_retained: config.session.max_retained_messages,
            max_tokens: config.completion.max_tokens,
            evict_after: config.evict_after(),
        }
    }
}

/// All conversation windows, keyed by channel ID.
pub struct SessionStore {
    windows: Mutex<HashMap<String, SharedWindow>>,
    policy: SessionPolicy,
    estimator: TokenEstimator,
}

impl SessionStore {
    pub fn new(policy: SessionPolicy, estimator: TokenEstimator) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            policy,
            estimator,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Window for `channel_id`, created empty if the channel is new.
    pub async fn get_or_create(&self, channel_id: &str, now: DateTime<Utc>) -> SharedWindow {
        let mut windows = self.windows.lock().await;
        windows
            .entry(channel_id.to_string())
            .or_insert_with(|| {
                debug!(channel = channel_id, "Created conversation window");
                Arc::new(Mutex::new(ConversationWindow::new(now)))
            })
            .clone()
    }

    pub async fn get(&self, channel_id: &str) -> Option<SharedWindow> {
        self.windows.lock().await.get(channel_id).cloned()
    }

    /// Append a turn to a channel's window. Empty content is a logged no-op.
    pub async fn append(&self, channel_id: &str, role: Role, content: &str) -> bool {
        let window = self.get_or_create(channel_id, Utc::now()).await;
        let mut window = window.lock().await;
        window.push(role, content, Utc::now())
    }

    /// Prepare a window for a new inbound message: expire it if it has been
    /// idle too long, then mark it active.
    pub fn on_inbound(&self, window: &mut ConversationWindow, now: DateTime<Utc>) {
        window.expire_idle(now, self.policy.timeout, self.policy.max_retained);
        window.touch(now);
    }

    /// Stored turns plus the pending user turn, trimmed to the token ceiling.
    pub fn candidate_turns(&self, window: &ConversationWindow, pending: Turn) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(window.len() + 1);
        turns.extend_from_slice(window.turns());
        turns.push(pending);
        fit_to_budget(&mut turns, &self.estimator, self.policy.max_tokens);
        turns
    }

    /// Clear a channel's history. Returns false if the channel was unknown.
    pub async fn reset(&self, channel_id: &str) -> bool {
        match self.get(channel_id).await {
            Some(window) => {
                window.lock().await.clear();
                info!(channel = channel_id, "Chat history reset");
                true
            }
            None => false,
        }
    }

    /// Drop windows idle for longer than the eviction TTL.
    ///
    /// A window is only dropped when the store holds its sole handle. A handler
    /// that fetched a window but has not locked it yet keeps it alive, so its
    /// commit always lands in the window the store will hand out next.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.policy.evict_after else {
            return 0;
        };

        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| {
            if Arc::strong_count(window) > 1 {
                return true;
            }
            match window.try_lock() {
                Ok(w) => now - w.last_activity() <= ttl,
                Err(_) => true,
            }
        });

        let evicted = before - windows.len();
        if evicted > 0 {
            info!(evicted, remaining = windows.len(), "Evicted idle conversation windows");
        }
        evicted
    }

    pub async fn channel_count(&self) -> usize {
        self.windows.lock().await.len()
    }
}
