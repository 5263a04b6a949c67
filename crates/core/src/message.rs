//! Message domain types.
//!
//! Messages are the value objects that flow through every cycle:
//! the prompt stage buffers them, memory folds them into history, and the
//! completion stage sends the history to the provider.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (role, rules, action reference). Never evicted.
    System,
    /// The end user, or the orchestrator speaking on the user's behalf
    User,
    /// The language model
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

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Optional author name (some providers use it in place of the role)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Return a copy of this message carrying an author name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.name.is_none());
        assert!(!msg.is_system());
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = Message::system("rules").with_name("planner");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("\"name\":\"planner\""));
    }

    #[test]
    fn name_is_omitted_when_absent() {
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert!(!json.contains("name"));
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
