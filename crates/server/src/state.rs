//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use concierge_agent::{BookingStore, ConciergeAgent, InMemoryBookingStore};
use concierge_config::{KnowledgeBaseManager, Settings};
use concierge_llm::{LlmBackend, LlmFactory};
use concierge_text_processing::MessageFormatter;

use crate::pending::PendingResponses;
use crate::session::SessionManager;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub agent: Arc<ConciergeAgent>,
    pub knowledge: KnowledgeBaseManager,
    pub sessions: Arc<SessionManager>,
    pub pending: Arc<PendingResponses>,
    pub formatter: MessageFormatter,
}

impl AppState {
    /// Build the state from settings: knowledge base, booking store and model
    pub fn new(config: Settings) -> Result<Self, ServerError> {
        let knowledge = KnowledgeBaseManager::new(&config.knowledge.data_dir);

        let store: Arc<dyn BookingStore> = match &config.bookings.persistence_path {
            Some(path) => Arc::new(
                InMemoryBookingStore::with_persistence(path)
                    .map_err(|e| ServerError::Config(format!("booking store: {}", e)))?,
            ),
            None => Arc::new(InMemoryBookingStore::new()),
        };

        let llm = LlmFactory::from_settings(&config.llm)?;
        if let Some(backend) = &llm {
            tracing::info!(model = backend.model_name(), "Language model configured");
        }

        Ok(Self::with_components(config, knowledge, store, llm))
    }

    /// Build the state from ready-made parts
    pub fn with_components(
        config: Settings,
        knowledge: KnowledgeBaseManager,
        store: Arc<dyn BookingStore>,
        llm: Option<Arc<dyn LlmBackend>>,
    ) -> Self {
        let agent = ConciergeAgent::new(knowledge.clone(), store, llm)
            .with_history_turns(config.llm.history_turns);

        let sessions = SessionManager::new(
            Duration::from_secs(config.server.session_ttl_seconds),
            Duration::from_secs(config.server.cleanup_interval_seconds.max(1)),
        );
        let pending = PendingResponses::new(Duration::from_secs(config.server.pending_ttl_seconds));

        Self {
            config: Arc::new(RwLock::new(config)),
            agent: Arc::new(agent),
            knowledge,
            sessions: Arc::new(sessions),
            pending: Arc::new(pending),
            formatter: MessageFormatter::new(),
        }
    }
}
