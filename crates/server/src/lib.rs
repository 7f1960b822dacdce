//! Concierge Server
//!
//! HTTP API for the concierge chat widget: chat messages, session handling,
//! response polling, knowledge base administration and the reply formatter.

pub mod http;
pub mod metrics;
pub mod pending;
pub mod session;
pub mod state;

pub use http::create_router;
pub use crate::metrics::{init_metrics, record_chat_latency, record_error, record_request};
pub use pending::{PendingResponses, PendingStatus, PollResponse};
pub use session::SessionManager;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::MissingField(_) | ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Agent(_) | ServerError::Config(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Attach the chat session the failing request belongs to
    pub fn in_session(self, session_id: impl Into<String>) -> ApiError {
        ApiError {
            error: self,
            session_id: Some(session_id.into()),
        }
    }
}

impl From<concierge_agent::AgentError> for ServerError {
    fn from(err: concierge_agent::AgentError) -> Self {
        ServerError::Agent(err.to_string())
    }
}

impl From<concierge_config::ConfigError> for ServerError {
    fn from(err: concierge_config::ConfigError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<concierge_llm::LlmError> for ServerError {
    fn from(err: concierge_llm::LlmError) -> Self {
        ServerError::Config(err.to_string())
    }
}

/// Error response: `{error, details, sessionId}`
#[derive(Debug)]
pub struct ApiError {
    pub error: ServerError,
    pub session_id: Option<String>,
}

impl From<ServerError> for ApiError {
    fn from(error: ServerError) -> Self {
        Self {
            error,
            session_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let summary = match status {
            StatusCode::BAD_REQUEST => "Invalid request",
            StatusCode::NOT_FOUND => "Not found",
            _ => "Internal server error",
        };

        if status.is_server_error() {
            tracing::error!(
                session_id = ?self.session_id,
                error = %self.error,
                "Request failed"
            );
            record_error(error_kind(&self.error));
        }

        let body = serde_json::json!({
            "error": summary,
            "details": self.error.to_string(),
            "sessionId": self.session_id,
        });
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

fn error_kind(error: &ServerError) -> &'static str {
    match error {
        ServerError::MissingField(_) | ServerError::InvalidRequest(_) => "invalid_request",
        ServerError::NotFound(_) => "not_found",
        ServerError::Agent(_) => "agent",
        ServerError::Config(_) => "config",
        ServerError::Internal(_) => "internal",
    }
}
