//! Chat client core
//!
//! Features:
//! - Chat history kept in a key-value storage (`chatHistory`, `sidebarCollapsed`)
//! - Message delivery with a request timeout and a polling fallback
//! - Cancellable polling per request id

pub mod client;
pub mod history;

pub use client::{ChatClient, ChatReply, ClientConfig, ReplyOrigin, CONNECTION_FALLBACK};
pub use history::{
    ChatHistoryStore, FileStorage, MemoryStorage, Storage, CHAT_HISTORY_KEY,
    SIDEBAR_COLLAPSED_KEY,
};

use thiserror::Error;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("No active session")]
    NoSession,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}
