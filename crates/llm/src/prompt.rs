//! Prompt building
//!
//! Turns the system prompt, the stored conversation and the new guest message
//! into the message list sent to the model.

use std::fmt;

use concierge_core::{Turn, TurnRole};
use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl From<TurnRole> for Role {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
            TurnRole::System => Role::System,
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.into(),
            content: turn.content.clone(),
        }
    }
}

/// Builder for the message list of one request
#[derive(Debug, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system prompt (always first)
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.retain(|m| m.role != Role::System);
        self.messages.insert(0, Message::system(content));
        self
    }

    /// Append the last `max_turns` turns of the conversation
    ///
    /// Stored system turns are skipped; the system prompt is set separately.
    pub fn with_history(mut self, turns: &[Turn], max_turns: usize) -> Self {
        let start = turns.len().saturating_sub(max_turns);
        self.messages.extend(
            turns[start..]
                .iter()
                .filter(|t| t.role != TurnRole::System)
                .map(Message::from),
        );
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::assistant(content));
        self
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_builder_order() {
        let history = vec![
            Turn::user("Ciao"),
            Turn::assistant("Buongiorno! Come posso aiutarla?"),
        ];

        let messages = PromptBuilder::new()
            .with_history(&history, 10)
            .user("A che ora è la colazione?")
            .system("Sei il concierge")
            .build();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Ciao");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].content, "A che ora è la colazione?");
    }

    #[test]
    fn test_history_is_truncated() {
        let history: Vec<Turn> = (0..6).map(|i| Turn::user(format!("msg {}", i))).collect();
        let messages = PromptBuilder::new().with_history(&history, 2).build();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "msg 4");
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::from(TurnRole::User), Role::User);
    }
}
