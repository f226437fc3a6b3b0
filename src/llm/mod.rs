//! LLM layer: everything that faces the completion API
//!
//! - Turn and role types shared with the session store
//! - Token estimation for budgets and window trimming
//! - The provider abstraction and its HTTP implementation

pub mod types;
pub mod tokens;
pub mod provider;
pub mod openai;

// Re-export key types
pub use openai::{CompletionClient, RetryPolicy};
pub use provider::CompletionProvider;
pub use tokens::TokenEstimator;
pub use types::{FunctionSpec, RequestOptions, Role, Turn};
