//! Universal types for conversation turns.
//!
//! These types isolate the relay logic from the completion API's wire format.

use serde::{Deserialize, Serialize};

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single role-tagged message in a conversation window.
///
/// Turns are immutable once built; the content is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    /// Build a turn, or `None` if the content is empty or whitespace-only.
    pub fn new(role: Role, content: impl Into<String>) -> Option<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return None;
        }
        Some(Self { role, content })
    }

    pub fn system(content: impl Into<String>) -> Option<Self> {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Option<Self> {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Option<Self> {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A function definition advertised to the completion API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Parameters that shape a completion request, independent of the conversation.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub model: String,
    pub temperature: f32,
    pub functions: Vec<FunctionSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_turn_rejected() {
        assert!(Turn::user("").is_none());
        assert!(Turn::assistant("   \n\t").is_none());
        assert!(Turn::system(" ").is_none());
    }

    #[test]
    fn test_turn_accessors() {
        let turn = Turn::system("be brief").unwrap();
        assert_eq!(turn.role(), Role::System);
        assert_eq!(turn.content(), "be brief");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let turn = Turn::assistant("hi").unwrap();
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn test_function_spec_defaults_parameters() {
        let spec: FunctionSpec = toml::from_str("name = \"extract_info\"").unwrap();
        assert_eq!(spec.parameters["type"], "object");
        assert!(spec.description.is_empty());
    }
}
