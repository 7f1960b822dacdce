//! Core types for the concierge chat
//!
//! This crate provides foundational types used across all other crates:
//! - Conversation turns exchanged with the language model
//! - Client-side chat sessions and messages

pub mod chat;
pub mod conversation;

pub use chat::{ChatMessage, ChatSession, Sender, DEFAULT_CHAT_TITLE};
pub use conversation::{Turn, TurnMetadata, TurnRole};

/// Generate a new opaque identifier (UUID v4, hyphenated)
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
