//! Claude backend
//!
//! Implements the Anthropic Messages API. The system prompt travels in the
//! top-level `system` field; the remaining messages alternate user/assistant.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::{error_for_status, with_retry, FinishReason, GenerationResult, LlmBackend};
use crate::prompt::{Message, Role};
use crate::LlmError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Resolve short model aliases to full model ids
pub fn resolve_model(model: &str) -> String {
    match model.to_lowercase().as_str() {
        "haiku" => "claude-3-haiku-20240307".to_string(),
        "haiku-3.5" => "claude-3-5-haiku-20241022".to_string(),
        "sonnet" | "sonnet-4" => "claude-sonnet-4-20250514".to_string(),
        _ => model.to_string(),
    }
}

/// Configuration for Claude backend
#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    /// API key (from ANTHROPIC_API_KEY or direct)
    pub api_key: String,
    /// Model id
    pub model: String,
    pub max_tokens: usize,
    /// Temperature (0.0 - 1.0)
    pub temperature: f32,
    pub timeout: Duration,
    /// API endpoint (for testing or proxy)
    pub endpoint: String,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: resolve_model("haiku"),
            max_tokens: 1024,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            endpoint: "https://api.anthropic.com".to_string(),
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl ClaudeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = resolve_model(model);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }
}

/// Claude backend
pub struct ClaudeBackend {
    config: ClaudeConfig,
    client: Client,
}

impl ClaudeBackend {
    pub fn new(config: ClaudeConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "ANTHROPIC_API_KEY not set. Set it via environment or config.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn build_request(&self, messages: &[Message]) -> ClaudeRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        ClaudeRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: convert_messages(messages),
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            },
            temperature: Some(self.config.temperature),
        }
    }

    async fn execute_request(&self, request: &ClaudeRequest) -> Result<ClaudeApiResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.endpoint))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

/// Convert to Claude messages, merging consecutive turns of the same role
fn convert_messages(messages: &[Message]) -> Vec<ClaudeMessage> {
    let mut out: Vec<ClaudeMessage> = Vec::new();

    for m in messages.iter().filter(|m| m.role != Role::System) {
        let role = m.role.to_string();
        match out.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&m.content);
            }
            _ => out.push(ClaudeMessage {
                role,
                content: m.content.clone(),
            }),
        }
    }

    // The API requires the first message to come from the user
    if out.first().map(|m| m.role == "assistant").unwrap_or(false) {
        out.remove(0);
    }

    out
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let request = self.build_request(messages);

        let response = with_retry(self.config.max_retries, self.config.initial_backoff, || {
            self.execute_request(&request)
        })
        .await?;

        let text: String = response
            .content
            .iter()
            .filter_map(|block| match block {
                ClaudeContentBlock::Text { text } => Some(text.as_str()),
                ClaudeContentBlock::Other => None,
            })
            .collect();

        Ok(GenerationResult {
            text,
            tokens: response.usage.output_tokens,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: match response.stop_reason.as_deref() {
                Some("max_tokens") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: usize,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ClaudeApiResponse {
    content: Vec<ClaudeContentBlock>,
    stop_reason: Option<String>,
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_aliases() {
        assert_eq!(resolve_model("haiku"), "claude-3-haiku-20240307");
        assert_eq!(resolve_model("claude-custom-model"), "claude-custom-model");
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = ClaudeConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            ClaudeBackend::new(config),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_builder() {
        let config = ClaudeConfig::new("test-key")
            .with_model("sonnet")
            .with_max_tokens(512)
            .with_temperature(1.5);
        assert_eq!(config.model, "claude-sonnet-4-20250514");
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.temperature, 1.0);
    }

    #[test]
    fn test_request_serialization() {
        let backend = ClaudeBackend::new(ClaudeConfig::new("test-key")).unwrap();
        let request = backend.build_request(&[
            Message::system("Sei il concierge"),
            Message::assistant("Benvenuto!"),
            Message::user("Ciao"),
            Message::user("Orari della spa?"),
        ]);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["system"], "Sei il concierge");
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Ciao\n\nOrari della spa?");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "id": "msg_1",
            "type": "message",
            "content": [{"type": "text", "text": "La spa apre alle 9."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 20, "output_tokens": 8}
        }"#;
        let response: ClaudeApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.usage.output_tokens, 8);
        assert!(matches!(
            &response.content[0],
            ClaudeContentBlock::Text { text } if text == "La spa apre alle 9."
        ));
    }
}
