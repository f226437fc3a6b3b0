//! Error taxonomy for the relay.

use thiserror::Error;

/// Coarse classification of a failed completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    Timeout,
    HttpError,
    ProtocolError,
    Unknown,
}

/// Failure of a completion call, after the retry policy has run.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("completion API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    Protocol(String),

    #[error("completion request failed: {0}")]
    Unknown(String),
}

impl CompletionError {
    pub fn kind(&self) -> CompletionErrorKind {
        match self {
            Self::Timeout { .. } => CompletionErrorKind::Timeout,
            Self::Http { .. } => CompletionErrorKind::HttpError,
            Self::Protocol(_) => CompletionErrorKind::ProtocolError,
            Self::Unknown(_) => CompletionErrorKind::Unknown,
        }
    }
}

/// Everything that can stop an inbound message from producing a reply.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("request rate limit reached")]
    RateLimited,

    #[error("daily token budget exceeded (needed {needed}, remaining {remaining})")]
    BudgetExceeded { needed: u64, remaining: u64 },

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("message has no content")]
    EmptyContent,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Text shown to the user for this failure, or `None` if it stays silent.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("An error occurred while processing your request."),
            Self::RateLimited => Some("The bot is currently busy. Please try again in a minute."),
            Self::BudgetExceeded { .. } => {
                Some("The bot has reached its daily token limit. Please try again tomorrow.")
            }
            Self::Completion(err) => Some(match err.kind() {
                CompletionErrorKind::Timeout => {
                    "Sorry, I'm having trouble connecting. Please try again later."
                }
                CompletionErrorKind::HttpError => {
                    "An error occurred while processing your request. Please try again later."
                }
                CompletionErrorKind::ProtocolError | CompletionErrorKind::Unknown => {
                    "Sorry, there was an error processing your message."
                }
            }),
            Self::EmptyContent => None,
            Self::Other(_) => Some("An unexpected error occurred. Please try again."),
        }
    }
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_kinds() {
        assert_eq!(
            CompletionError::Timeout { attempts: 3 }.kind(),
            CompletionErrorKind::Timeout
        );
        assert_eq!(
            CompletionError::Http { status: 500, body: String::new() }.kind(),
            CompletionErrorKind::HttpError
        );
        assert_eq!(
            CompletionError::Protocol("x".into()).kind(),
            CompletionErrorKind::ProtocolError
        );
    }

    #[test]
    fn test_empty_content_is_silent() {
        assert!(RelayError::EmptyContent.user_message().is_none());
    }

    #[test]
    fn test_timeout_message() {
        let err = RelayError::from(CompletionError::Timeout { attempts: 3 });
        assert_eq!(
            err.user_message(),
            Some("Sorry, I'm having trouble connecting. Please try again later.")
        );
    }

    #[test]
    fn test_unexpected_message() {
        let err = RelayError::from(anyhow::anyhow!("boom"));
        assert_eq!(
            err.user_message(),
            Some("An unexpected error occurred. Please try again.")
        );
    }
}
