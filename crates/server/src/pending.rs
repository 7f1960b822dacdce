//! Pending responses
//!
//! A chat request may carry a client-chosen request id. While the agent works
//! on it the id is `pending`; once done the reply (or the error) is kept for a
//! while so a client whose HTTP call timed out can fetch it by polling.
//!
//! Every entry lives for the TTL after its last update. A request still
//! `pending` that long has outlived the request timeout and will not finish.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Status reported to polling clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Completed,
    Failed,
    Unknown,
}

/// Body of `GET /api/chat/poll/:request_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub request_id: String,
    pub status: PendingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    status: PendingStatus,
    session_id: String,
    message: Option<String>,
    error: Option<String>,
    updated_at: Instant,
}

/// Registry of in-flight and recently finished requests
#[derive(Debug)]
pub struct PendingResponses {
    entries: DashMap<String, PendingEntry>,
    ttl: Duration,
}

impl PendingResponses {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Mark a request as started
    ///
    /// Expired entries are purged on the way in.
    pub fn begin(&self, request_id: &str, session_id: &str) {
        self.purge_expired();
        self.entries.insert(
            request_id.to_string(),
            PendingEntry {
                status: PendingStatus::Pending,
                session_id: session_id.to_string(),
                message: None,
                error: None,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn complete(&self, request_id: &str, message: &str) {
        if let Some(mut entry) = self.entries.get_mut(request_id) {
            entry.status = PendingStatus::Completed;
            entry.message = Some(message.to_string());
            entry.updated_at = Instant::now();
        }
    }

    pub fn fail(&self, request_id: &str, error: &str) {
        if let Some(mut entry) = self.entries.get_mut(request_id) {
            entry.status = PendingStatus::Failed;
            entry.error = Some(error.to_string());
            entry.updated_at = Instant::now();
        }
    }

    /// Current state of a request; unknown and expired ids report `unknown`
    pub fn poll(&self, request_id: &str) -> PollResponse {
        let entry = self
            .entries
            .get(request_id)
            .map(|e| e.value().clone())
            .filter(|e| !self.is_expired(e));

        match entry {
            Some(entry) => PollResponse {
                request_id: request_id.to_string(),
                status: entry.status,
                message: entry.message,
                session_id: Some(entry.session_id),
                error: entry.error,
            },
            None => PollResponse {
                request_id: request_id.to_string(),
                status: PendingStatus::Unknown,
                message: None,
                session_id: None,
                error: None,
            },
        }
    }

    /// Drop entries not updated within the TTL; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &PendingEntry) -> bool {
        entry.updated_at.elapsed() > self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let pending = PendingResponses::new(Duration::from_secs(60));
        assert_eq!(pending.poll("req-1").status, PendingStatus::Unknown);

        pending.begin("req-1", "session-1");
        let poll = pending.poll("req-1");
        assert_eq!(poll.status, PendingStatus::Pending);
        assert!(poll.message.is_none());

        pending.complete("req-1", "Buongiorno!");
        let poll = pending.poll("req-1");
        assert_eq!(poll.status, PendingStatus::Completed);
        assert_eq!(poll.message.as_deref(), Some("Buongiorno!"));
        assert_eq!(poll.session_id.as_deref(), Some("session-1"));
    }

    #[test]
    fn test_failure_reported() {
        let pending = PendingResponses::new(Duration::from_secs(60));
        pending.begin("req-2", "s");
        pending.fail("req-2", "LLM error: timeout");
        let poll = pending.poll("req-2");
        assert_eq!(poll.status, PendingStatus::Failed);
        assert_eq!(poll.error.as_deref(), Some("LLM error: timeout"));
    }

    #[test]
    fn test_finished_entries_expire() {
        let pending = PendingResponses::new(Duration::from_millis(30));
        pending.begin("done", "s");
        pending.complete("done", "ok");
        std::thread::sleep(Duration::from_millis(50));

        pending.begin("fresh", "s");
        assert_eq!(pending.poll("done").status, PendingStatus::Unknown);
        assert_eq!(pending.poll("fresh").status, PendingStatus::Pending);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_abandoned_requests_expire() {
        let pending = PendingResponses::new(Duration::from_millis(30));
        pending.begin("stuck", "s");
        assert_eq!(pending.poll("stuck").status, PendingStatus::Pending);
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(pending.poll("stuck").status, PendingStatus::Unknown);
        assert_eq!(pending.purge_expired(), 1);
        assert!(pending.is_empty());

        // A late completion does not bring it back
        pending.complete("stuck", "troppo tardi");
        assert_eq!(pending.poll("stuck").status, PendingStatus::Unknown);
    }

    #[test]
    fn test_serialization() {
        let pending = PendingResponses::new(Duration::from_secs(60));
        let json = serde_json::to_value(pending.poll("abc")).unwrap();
        assert_eq!(json, serde_json::json!({"requestId": "abc", "status": "unknown"}));
    }
}
