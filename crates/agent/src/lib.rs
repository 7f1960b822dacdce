//! Concierge agent
//!
//! Features:
//! - Booking intents answered from the booking store with Italian templates
//! - Everything else answered by the language model, grounded on the hotel
//!   knowledge base
//! - Per-session conversation history

pub mod booking;
pub mod concierge;
pub mod conversation;

pub use booking::{
    Booking, BookingError, BookingReply, BookingService, BookingStatus, BookingStore,
    BookingUpdate, InMemoryBookingStore, NewBooking,
};
pub use concierge::{AgentResponse, ConciergeAgent, ResponseSource};
pub use conversation::Conversation;

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Booking error: {0}")]
    Booking(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<concierge_llm::LlmError> for AgentError {
    fn from(err: concierge_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl From<BookingError> for AgentError {
    fn from(err: BookingError) -> Self {
        AgentError::Booking(err.to_string())
    }
}

impl From<concierge_config::ConfigError> for AgentError {
    fn from(err: concierge_config::ConfigError) -> Self {
        AgentError::Configuration(err.to_string())
    }
}
