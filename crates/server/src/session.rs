//! Session Management
//!
//! One conversation per chat session id. Sessions live in memory and are
//! dropped after a period without activity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;

use concierge_agent::Conversation;

use crate::pending::PendingResponses;

/// Session manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Conversation>>>,
    session_ttl: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(session_ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
            cleanup_interval,
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Create a session under a fresh, unused id
    pub fn create(&self) -> Arc<Conversation> {
        let mut sessions = self.sessions.write();
        let id = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let conversation = Arc::new(Conversation::new(id.clone()));
        sessions.insert(id.clone(), conversation.clone());

        tracing::info!(session_id = %id, "Created session");
        conversation
    }

    pub fn get(&self, id: &str) -> Option<Arc<Conversation>> {
        self.sessions.read().get(id).cloned()
    }

    /// Session for a client-supplied id
    ///
    /// An unknown id (e.g. one kept by the client across a server restart) is
    /// adopted rather than rejected; no id at all gets a fresh session.
    pub fn get_or_create(&self, id: Option<&str>) -> Arc<Conversation> {
        let Some(id) = id.filter(|id| !id.trim().is_empty()) else {
            return self.create();
        };

        if let Some(conversation) = self.get(id) {
            conversation.touch();
            return conversation;
        }

        self.sessions
            .write()
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id = %id, "Adopted client session");
                Arc::new(Conversation::new(id))
            })
            .clone()
    }

    /// Remove a session; returns whether it existed
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Removed session");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Drop sessions idle for longer than the TTL; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let ttl = chrono::Duration::from_std(self.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(36500));
        let now = Utc::now();

        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|id, conversation| {
            let keep = now - conversation.last_activity() <= ttl;
            if !keep {
                tracing::debug!(session_id = %id, "Expired session");
            }
            keep
        });
        before - sessions.len()
    }

    /// Periodically remove expired sessions and stale pending replies until
    /// the returned sender sends `true`
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        pending: Arc<PendingResponses>,
    ) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(
                                "Session cleanup: removed {} expired sessions ({} remaining)",
                                removed,
                                manager.count()
                            );
                        }
                        let purged = pending.purge_expired();
                        if purged > 0 {
                            tracing::debug!("Pending cleanup: removed {} stale replies", purged);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(Duration::from_secs(3600), Duration::from_secs(60))
    }

    #[test]
    fn test_session_creation() {
        let manager = manager();
        let session = manager.create();
        assert_eq!(manager.count(), 1);
        assert!(manager.get(session.session_id()).is_some());
    }

    #[test]
    fn test_new_ids_are_unique() {
        let manager = manager();
        let first = manager.create();
        let second = manager.create();
        assert_ne!(first.session_id(), second.session_id());
    }

    #[test]
    fn test_get_or_create_adopts_client_id() {
        let manager = manager();
        let session = manager.get_or_create(Some("client-chat-1"));
        assert_eq!(session.session_id(), "client-chat-1");

        session.add_user_turn("Ciao");
        let again = manager.get_or_create(Some("client-chat-1"));
        assert_eq!(again.turn_count(), 1);

        let fresh = manager.get_or_create(Some("  "));
        assert_ne!(fresh.session_id(), "  ");
        assert_eq!(manager.count(), 2);
    }

    #[test]
    fn test_session_remove() {
        let manager = manager();
        let id = manager.create().session_id().to_string();
        assert!(manager.remove(&id));
        assert!(!manager.remove(&id));
        assert!(manager.get(&id).is_none());
    }

    #[test]
    fn test_cleanup_expired() {
        let manager = SessionManager::new(Duration::ZERO, Duration::from_secs(60));
        manager.create();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(manager.cleanup_expired(), 1);
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_task_shutdown() {
        let manager = Arc::new(SessionManager::new(
            Duration::ZERO,
            Duration::from_millis(10),
        ));
        manager.create();
        let pending = Arc::new(PendingResponses::new(Duration::ZERO));
        pending.begin("req-1", "s");
        pending.complete("req-1", "Buonanotte");

        let shutdown = manager.start_cleanup_task(Arc::clone(&pending));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.count(), 0);
        assert!(pending.is_empty());
        shutdown.send(true).unwrap();
    }
}
