//! Client-side chat sessions
//!
//! A chat session is what the widget keeps in local storage: the ordered
//! messages, a title taken from the first guest message and the time of the
//! last update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Title used until the guest writes something
pub const DEFAULT_CHAT_TITLE: &str = "Nuova chat";

/// Maximum title length in graphemes, before the ellipsis
const TITLE_MAX_GRAPHEMES: usize = 30;

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A chat bubble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text)
    }
}

/// Stored chat session
///
/// Serialized as `{messages, timestamp, title}`; the id is the key of the
/// surrounding map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_title() -> String {
    DEFAULT_CHAT_TITLE.to_string()
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    /// Create an empty session
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            timestamp: Utc::now(),
            title: default_title(),
        }
    }

    /// Append a message, refreshing the timestamp and the title
    pub fn push(&mut self, message: ChatMessage) {
        self.timestamp = message.timestamp;
        self.messages.push(message);
        self.title = self.derive_title();
    }

    /// Title derived from the first user message
    pub fn derive_title(&self) -> String {
        self.messages
            .iter()
            .find(|m| m.sender == Sender::User)
            .map(|m| title_from_text(&m.text))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(default_title)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Collapse whitespace and truncate to the title length
pub fn title_from_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let graphemes: Vec<&str> = collapsed.graphemes(true).collect();
    if graphemes.len() <= TITLE_MAX_GRAPHEMES {
        collapsed
    } else {
        format!("{}...", graphemes[..TITLE_MAX_GRAPHEMES].concat().trim_end())
    }
}
