//! Configuration management for relaybot
//!
//! Handles loading, validation and persistence of the bot's settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::RelayError;
use crate::llm::types::{FunctionSpec, RequestOptions};

/// Default OpenAI-compatible chat completions endpoint
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Environment variable holding the completion API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Completion request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Model name sent with every request
    pub model: String,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Per-attempt request timeout in seconds
    pub timeout_secs: f64,
    /// Token ceiling for the history sent with one request
    pub max_tokens: u64,
    /// Total attempts made when requests time out
    pub max_retries: u32,
    /// Delay between timed-out attempts, in seconds
    pub retry_delay_secs: f64,
    /// Chat completions endpoint
    pub api_url: String,
    /// Optional function definitions advertised to the model
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionSpec>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            timeout_secs: 30.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_delay_secs: 25.0,
            api_url: DEFAULT_API_URL.to_string(),
            functions: Vec::new(),
        }
    }
}

/// Process-wide usage limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Daily token cap across all channels (0 = unlimited)
    pub daily_token_cap: u64,
    /// Requests admitted per 60s window (0 rejects everything)
    pub requests_per_minute: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_token_cap: 100_000,
            requests_per_minute: 60,
        }
    }
}

/// Conversation window lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle minutes before a window is trimmed (0 = never)
    pub timeout_minutes: u64,
    /// Turns kept when an idle window is trimmed (0 = clear all)
    pub max_retained_messages: usize,
    /// Idle minutes before a window is dropped entirely (0 = never)
    pub evict_after_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 60,
            max_retained_messages: 2,
            evict_after_minutes: 0,
        }
    }
}

/// Bot behaviour toward users
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Static instructions appended to the synthesized system turn
    pub system_instructions: String,
    /// Answer every message with `disabled_message` and do nothing else
    pub disabled: bool,
    pub disabled_message: String,
    /// Allow `/reset` to clear a channel's history
    pub reset_command_enabled: bool,
    /// Restrict `/reset` to `admin_ids`
    pub admin_only_reset: bool,
    pub admin_ids: Vec<String>,
    /// Longest outbound message the platform accepts
    pub max_message_chars: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            system_instructions: "You are an OpenAI API-based chatbot on Discord.".to_string(),
            disabled: false,
            disabled_message: "The bot is currently disabled.".to_string(),
            reset_command_enabled: false,
            admin_only_reset: true,
            admin_ids: Vec::new(),
            max_message_chars: 4096,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit the chat transcript on the `relaybot::chat` tracing target
    pub chat_log: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Usage counter file (defaults to ~/.relaybot/token_usage.json)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_file: Option<PathBuf>,
}

/// relaybot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Get the config file path (~/.relaybot/config.toml)
    pub fn path() -> Result<PathBuf> {
        Ok(relaybot_dir()?.join("config.toml"))
    }

    /// Check if config exists
    pub fn exists() -> bool {
        Self::path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Load config from disk, or return None if it doesn't exist
    pub fn load() -> Result<Option<Self>> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load config from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Reject numeric settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        let c = &self.completion;

        if !c.temperature.is_finite() || !(0.0..=2.0).contains(&c.temperature) {
            return Err(RelayError::Config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                c.temperature
            )));
        }
        match Duration::try_from_secs_f64(c.timeout_secs) {
            Ok(d) if !d.is_zero() => {}
            _ => {
                return Err(RelayError::Config(format!(
                    "timeout_secs must be a positive number, got {}",
                    c.timeout_secs
                )))
            }
        }
        if Duration::try_from_secs_f64(c.retry_delay_secs).is_err() {
            return Err(RelayError::Config(format!(
                "retry_delay_secs must be a non-negative number, got {}",
                c.retry_delay_secs
            )));
        }
        if c.max_retries == 0 {
            return Err(RelayError::Config("max_retries must be at least 1".into()));
        }
        if c.max_tokens == 0 {
            return Err(RelayError::Config("max_tokens must be at least 1".into()));
        }
        if self.bot.max_message_chars == 0 {
            return Err(RelayError::Config("max_message_chars must be at least 1".into()));
        }
        for (name, value) in [
            ("timeout_minutes", self.session.timeout_minutes),
            ("evict_after_minutes", self.session.evict_after_minutes),
        ] {
            if value != 0 && minutes(value).is_none() {
                return Err(RelayError::Config(format!(
                    "{} is out of range, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.completion.timeout_secs).unwrap_or(Duration::from_secs(30))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.completion.retry_delay_secs).unwrap_or(Duration::ZERO)
    }

    pub fn session_timeout(&self) -> Option<chrono::Duration> {
        minutes(self.session.timeout_minutes)
    }

    pub fn evict_after(&self) -> Option<chrono::Duration> {
        minutes(self.session.evict_after_minutes)
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            model: self.completion.model.clone(),
            temperature: self.completion.temperature,
            functions: self.completion.functions.clone(),
        }
    }

    /// Resolved path of the usage counter file
    pub fn usage_file(&self) -> Result<PathBuf> {
        match &self.storage.usage_file {
            Some(path) => Ok(path.clone()),
            None => Ok(relaybot_dir()?.join("token_usage.json")),
        }
    }

    pub fn is_admin(&self, sender_id: &str) -> bool {
        self.bot.admin_ids.iter().any(|id| id == sender_id)
    }
}

/// 0 means "disabled" for every minute-based setting.
fn minutes(value: u64) -> Option<chrono::Duration> {
    if value == 0 {
        return None;
    }
    i64::try_from(value).ok().and_then(chrono::Duration::try_minutes)
}

/// Get the base relaybot directory path (~/.relaybot)
pub fn relaybot_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".relaybot"))
}
