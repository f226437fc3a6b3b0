//! OpenAI-compatible completion client.
//!
//! Implements `CompletionProvider` against a Chat Completions endpoint, with a
//! fixed-delay retry policy that only retries timeouts.

use super::provider::CompletionProvider;
use super::types::{FunctionSpec, RequestOptions, Turn};
use crate::config::Config;
use crate::error::CompletionError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// How timed-out requests are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Completion client configuration and state.
pub struct CompletionClient {
    client: Client,
    api_url: String,
    api_key: String,
    options: RequestOptions,
    retry: RetryPolicy,
}

impl CompletionClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        options: RequestOptions,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            options,
            retry,
        })
    }

    pub fn from_config(config: &Config, api_key: impl Into<String>) -> Result<Self> {
        Self::new(
            config.completion.api_url.clone(),
            api_key,
            config.request_options(),
            config.request_timeout(),
            RetryPolicy::new(config.completion.max_retries, config.retry_delay()),
        )
    }

    fn build_request<'a>(&'a self, system: &'a Turn, turns: &'a [Turn]) -> ChatRequest<'a> {
        let functions = (!self.options.functions.is_empty()).then_some(&self.options.functions[..]);

        ChatRequest {
            model: &self.options.model,
            messages: std::iter::once(system).chain(turns).map(ApiMessage::from).collect(),
            temperature: self.options.temperature,
            function_call: functions.map(|_| "auto"),
            functions,
        }
    }

    /// One request/response exchange. No retries, no shared state.
    async fn attempt(&self, request: &ChatRequest<'_>) -> Result<String, AttemptError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(AttemptError::from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(AttemptError::from_transport)?;

        if status != StatusCode::OK {
            return Err(AttemptError::Fatal(CompletionError::Http {
                status: status.as_u16(),
                body,
            }));
        }

        parse_reply(&body).map_err(AttemptError::Fatal)
    }
}

#[async_trait]
impl CompletionProvider for CompletionClient {
    fn model(&self) -> &str {
        &self.options.model
    }

    async fn complete(&self, system: &Turn, turns: &[Turn]) -> Result<String, CompletionError> {
        let request = self.build_request(system, turns);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, messages = request.messages.len(), model = %self.options.model, "Sending completion request");

            match self.attempt(&request).await {
                Ok(reply) => return Ok(reply),
                Err(AttemptError::Timeout) if attempt < self.retry.max_attempts => {
                    warn!(attempt, delay = ?self.retry.delay, "Completion request timed out, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(AttemptError::Timeout) => {
                    error!(attempts = attempt, "Max retries reached. Giving up.");
                    return Err(CompletionError::Timeout { attempts: attempt });
                }
                Err(AttemptError::Fatal(e)) => {
                    error!(attempt, error = %e, "Completion request failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Outcome of a single failed attempt: retryable or final.
enum AttemptError {
    Timeout,
    Fatal(CompletionError),
}

impl AttemptError {
    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Fatal(CompletionError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            })
        } else {
            Self::Fatal(CompletionError::Unknown(e.to_string()))
        }
    }
}

/// Extract the first choice's text from a 200 response body.
fn parse_reply(body: &str) -> Result<String, CompletionError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Protocol(format!("invalid JSON body: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Protocol("no choices returned".into()))?;

    let content = choice.message.content.unwrap_or_default();
    let content = content.trim();
    if content.is_empty() {
        return Err(CompletionError::Protocol("first choice has no content".into()));
    }
    Ok(content.to_string())
}

// -----------------------------------------------------------------------------
// Chat Completions DTOs
// -----------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<&'a [FunctionSpec]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<&'static str>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Turn> for ApiMessage<'a> {
    fn from(turn: &'a Turn) -> Self {
        Self {
            role: turn.role().as_str(),
            content: turn.content(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
