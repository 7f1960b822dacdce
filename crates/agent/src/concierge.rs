//! Concierge agent
//!
//! Routes each guest message either to the booking service or to the
//! language model, and records the exchange in the conversation.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use concierge_config::{KnowledgeBaseManager, PromptTemplates};
use concierge_core::{Turn, TurnMetadata};
use concierge_llm::{LlmBackend, PromptBuilder};
use concierge_text_processing::{BookingIntent, BookingIntentMatcher};

use crate::booking::{BookingService, BookingStore};
use crate::conversation::Conversation;
use crate::AgentError;

/// Default number of past turns sent to the model
const DEFAULT_HISTORY_TURNS: usize = 10;

/// Where a reply came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Booking,
    Llm,
    Fallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Booking => "booking",
            ResponseSource::Llm => "llm",
            ResponseSource::Fallback => "fallback",
        }
    }
}

/// Reply to one guest message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub message: String,
    pub intent: BookingIntent,
    pub source: ResponseSource,
}

/// Digital concierge
pub struct ConciergeAgent {
    knowledge: KnowledgeBaseManager,
    prompts: PromptTemplates,
    llm: Option<Arc<dyn LlmBackend>>,
    matcher: BookingIntentMatcher,
    bookings: BookingService,
    history_turns: usize,
}

impl ConciergeAgent {
    pub fn new(
        knowledge: KnowledgeBaseManager,
        store: Arc<dyn BookingStore>,
        llm: Option<Arc<dyn LlmBackend>>,
    ) -> Self {
        if llm.is_none() {
            tracing::warn!("No language model configured, general questions get the fallback reply");
        }
        Self {
            knowledge,
            prompts: PromptTemplates::default(),
            llm,
            matcher: BookingIntentMatcher::new(),
            bookings: BookingService::new(store),
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBaseManager {
        &self.knowledge
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Answer one guest message
    ///
    /// Only a failing model call returns an error; the conversation is left
    /// untouched in that case.
    pub async fn process(
        &self,
        conversation: &Conversation,
        message: &str,
        user_id: Option<&str>,
    ) -> Result<AgentResponse, AgentError> {
        let start = Instant::now();
        let detected = self.matcher.detect(message);

        tracing::debug!(
            session_id = %conversation.session_id(),
            intent = %detected.intent,
            "Intent detected"
        );

        let (reply, source) = if detected.intent.is_booking_action() {
            let reply = self.bookings.handle(&detected, user_id).await;
            (reply.message, ResponseSource::Booking)
        } else {
            match &self.llm {
                Some(llm) => {
                    let text = self.ask_llm(llm.as_ref(), conversation, message).await?;
                    (text, ResponseSource::Llm)
                }
                None => (self.prompts.fallback_message.clone(), ResponseSource::Fallback),
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        conversation.add_exchange(
            Turn::user(message)
                .with_metadata(TurnMetadata::new().with_intent(detected.intent.as_str())),
            Turn::assistant(reply.as_str()).with_metadata(
                TurnMetadata::new()
                    .with_intent(detected.intent.as_str())
                    .with_source(source.as_str())
                    .with_latency(latency_ms),
            ),
        );

        tracing::info!(
            session_id = %conversation.session_id(),
            intent = %detected.intent,
            source = source.as_str(),
            latency_ms,
            "Message processed"
        );

        Ok(AgentResponse {
            message: reply,
            intent: detected.intent,
            source,
        })
    }

    async fn ask_llm(
        &self,
        llm: &dyn LlmBackend,
        conversation: &Conversation,
        message: &str,
    ) -> Result<String, AgentError> {
        let system_prompt = self.prompts.build_system_prompt(&self.knowledge.snapshot());
        let messages = PromptBuilder::new()
            .system(system_prompt)
            .with_history(&conversation.turns(), self.history_turns)
            .user(message)
            .build();

        let start = Instant::now();
        let result = llm.generate(&messages).await;
        metrics::histogram!("concierge_llm_latency_seconds").record(start.elapsed().as_secs_f64());

        let result = result.map_err(|e| {
            metrics::counter!("concierge_errors_total", "kind" => "llm").increment(1);
            tracing::error!(model = llm.model_name(), error = %e, "LLM generation failed");
            e
        })?;

        tracing::debug!(
            model = llm.model_name(),
            tokens = result.tokens,
            total_time_ms = result.total_time_ms,
            "LLM reply generated"
        );

        let text = result.text.trim();
        if text.is_empty() {
            tracing::warn!("LLM returned an empty reply");
            return Ok(self.prompts.fallback_message.clone());
        }
        Ok(text.to_string())
    }
}
