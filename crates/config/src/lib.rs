//! Configuration management for the concierge
//!
//! Supports loading configuration from:
//! - YAML/JSON/TOML files under `config/`
//! - Environment variables (CONCIERGE__ prefix)
//!
//! The hotel knowledge base (restaurant, activities, events, services) lives
//! in a data directory with one file per category, see [`knowledge`].

pub mod knowledge;
pub mod prompts;
pub mod settings;

pub use knowledge::{KnowledgeBase, KnowledgeBaseManager};
pub use prompts::{FormattingGuide, PromptTemplates};
pub use settings::{
    load_settings, BookingSettings, KnowledgeSettings, LlmSettings, ObservabilityConfig,
    RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Knowledge base category not found: {0}")]
    CategoryNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
