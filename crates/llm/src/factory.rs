//! LLM factory
//!
//! Creates the configured backend from settings. A provider of `none`, or a
//! missing API key, yields no backend; the agent then answers with its
//! fallback message.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use concierge_config::LlmSettings;

use crate::backend::{LlmBackend, OpenAIBackend, OpenAIConfig};
use crate::claude::{resolve_model, ClaudeBackend, ClaudeConfig};
use crate::LlmError;

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Claude (Anthropic)
    #[default]
    Claude,
    /// OpenAI or any OpenAI-compatible server
    OpenAI,
    /// No model; fallback replies only
    None,
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(LlmProvider::Claude),
            "openai" | "gpt" | "openai-compatible" => Ok(LlmProvider::OpenAI),
            "none" | "disabled" | "" => Ok(LlmProvider::None),
            _ => Err(LlmError::Configuration(format!("Unknown LLM provider: {}", s))),
        }
    }
}

/// Builds backends from settings
pub struct LlmFactory;

impl LlmFactory {
    /// Create the backend described by `settings`
    ///
    /// Returns `Ok(None)` when no model should be used.
    pub fn from_settings(settings: &LlmSettings) -> Result<Option<Arc<dyn LlmBackend>>, LlmError> {
        let provider: LlmProvider = settings.provider.parse()?;

        let timeout = Duration::from_secs(settings.timeout_seconds);
        let api_key = settings.resolved_api_key();

        let backend: Arc<dyn LlmBackend> = match provider {
            LlmProvider::None => return Ok(None),
            LlmProvider::Claude => {
                let Some(api_key) = api_key else {
                    tracing::warn!("Claude selected but no API key found");
                    return Ok(None);
                };
                let mut config = ClaudeConfig::new(api_key)
                    .with_model(&settings.model)
                    .with_max_tokens(settings.max_tokens)
                    .with_temperature(settings.temperature);
                config.timeout = timeout;
                config.max_retries = settings.max_retries;
                if let Some(endpoint) = &settings.endpoint {
                    config.endpoint = endpoint.clone();
                }
                Arc::new(ClaudeBackend::new(config)?)
            }
            LlmProvider::OpenAI => {
                let mut config = OpenAIConfig {
                    api_key: api_key.unwrap_or_default(),
                    model: settings.model.clone(),
                    max_tokens: settings.max_tokens,
                    temperature: settings.temperature,
                    timeout,
                    max_retries: settings.max_retries,
                    ..Default::default()
                };
                if let Some(endpoint) = &settings.endpoint {
                    config.endpoint = endpoint.clone();
                }
                if config.api_key.is_empty() && settings.endpoint.is_none() {
                    tracing::warn!("OpenAI selected but no API key found");
                    return Ok(None);
                }
                Arc::new(OpenAIBackend::new(config)?)
            }
        };

        tracing::info!(
            provider = ?provider,
            model = %backend.model_name(),
            "LLM backend created"
        );

        Ok(Some(backend))
    }

    /// Model id the settings resolve to (for logging and health output)
    pub fn model_id(settings: &LlmSettings) -> String {
        match settings.provider.parse::<LlmProvider>() {
            Ok(LlmProvider::Claude) => resolve_model(&settings.model),
            _ => settings.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Anthropic".parse::<LlmProvider>().ok(), Some(LlmProvider::Claude));
        assert_eq!("openai".parse::<LlmProvider>().ok(), Some(LlmProvider::OpenAI));
        assert_eq!("none".parse::<LlmProvider>().ok(), Some(LlmProvider::None));
        assert!(matches!(
            "mistery".parse::<LlmProvider>(),
            Err(LlmError::Configuration(msg)) if msg == "Unknown LLM provider: mistery"
        ));
    }

    #[test]
    fn test_none_provider_has_no_backend() {
        let settings = LlmSettings {
            provider: "none".to_string(),
            ..Default::default()
        };
        assert!(LlmFactory::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_unknown_provider_is_error() {
        let settings = LlmSettings {
            provider: "mistery".to_string(),
            ..Default::default()
        };
        assert!(LlmFactory::from_settings(&settings).is_err());
    }

    #[test]
    fn test_claude_backend_with_key() {
        let settings = LlmSettings {
            provider: "claude".to_string(),
            model: "haiku".to_string(),
            api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let backend = LlmFactory::from_settings(&settings).unwrap().unwrap();
        assert_eq!(backend.model_name(), "claude-3-haiku-20240307");
    }

    #[test]
    fn test_local_openai_without_key() {
        let settings = LlmSettings {
            provider: "openai".to_string(),
            model: "llama3".to_string(),
            endpoint: Some("http://localhost:8000/v1".to_string()),
            api_key: Some(String::new()),
            ..Default::default()
        };
        let backend = LlmFactory::from_settings(&settings).unwrap().unwrap();
        assert_eq!(backend.model_name(), "llama3");
    }
}
