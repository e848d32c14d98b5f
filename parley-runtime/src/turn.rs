//! Conversation turns

use serde::{Deserialize, Serialize};

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
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message unit.
///
/// Turns are immutable once built; the dispatcher only ever borrows them, so
/// a retried exchange always resends exactly what the user typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    text: String,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_constructors() {
        let turn = ConversationTurn::user("hello");
        assert_eq!(turn.role(), Role::User);
        assert_eq!(turn.text(), "hello");

        assert_eq!(ConversationTurn::system("be brief").role(), Role::System);
        assert_eq!(ConversationTurn::assistant("hi").role(), Role::Assistant);
    }

    #[test]
    fn test_turn_serializes_lowercase_role() {
        let json = serde_json::to_value(ConversationTurn::user("hello")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "text": "hello"}));
    }
}
