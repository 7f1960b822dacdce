//! HTTP chat client
//!
//! Every message goes out once with a request id and a timeout. When the
//! timeout hits, the reply is fetched from the poll endpoint with a linear
//! backoff until it arrives, the attempts run out or the poll is cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use concierge_core::ChatMessage;

use crate::history::ChatHistoryStore;
use crate::ClientError;

/// Reply shown when the server cannot be reached
pub const CONNECTION_FALLBACK: &str =
    "Mi dispiace, si è verificato un problema di connessione. Riprova tra qualche istante.";

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, without trailing slash
    pub base_url: String,
    /// Timeout of the initial message request
    pub request_timeout: Duration,
    /// Base poll delay; attempt `n` waits `n * poll_interval`
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Logged-in guest, forwarded for booking actions
    pub user_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 5,
            user_id: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// How a reply was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyOrigin {
    /// Answer to the message request itself
    Direct,
    /// Answer fetched from the poll endpoint
    Polled,
    /// Connection fallback text
    Fallback,
    /// Polling stopped by the caller; no text
    Cancelled,
}

/// Reply to one guest message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub text: String,
    pub session_id: Option<String>,
    pub origin: ReplyOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

impl ChatReply {
    fn fallback(session_id: Option<String>) -> Self {
        Self {
            text: CONNECTION_FALLBACK.to_string(),
            session_id,
            origin: ReplyOrigin::Fallback,
            intent: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    request_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    message: String,
    session_id: Option<String>,
    intent: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollBody {
    status: String,
    message: Option<String>,
    session_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    details: Option<String>,
}

enum PollOutcome {
    Reply(String, Option<String>),
    Failed,
    Cancelled,
    Exhausted,
}

/// Chat client bound to one server
pub struct ChatClient {
    http: reqwest::Client,
    config: ClientConfig,
    session_id: RwLock<Option<String>>,
    /// Request id → polling still wanted
    polling: Arc<Mutex<HashMap<String, bool>>>,
    history: Option<ChatHistoryStore>,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self {
            http,
            config,
            session_id: RwLock::new(None),
            polling: Arc::new(Mutex::new(HashMap::new())),
            history: None,
        })
    }

    /// Record every exchange in a local history, keyed by session id
    pub fn with_history(mut self, history: ChatHistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn history(&self) -> Option<&ChatHistoryStore> {
        self.history.as_ref()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Resume an existing session
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        *self.session_id.write() = Some(session_id.into());
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Ask the server for a fresh session, dropping the current one
    pub async fn init_session(&self) -> Result<String, ClientError> {
        let old = self.session_id();
        let response = self
            .http
            .post(self.url("/api/chat/init-session"))
            .json(&SessionBody {
                session_id: old.as_deref(),
            })
            .send()
            .await?;
        let body: SessionResponse = check_status(response).await?.json().await?;

        tracing::info!(
            old_session = ?old,
            session_id = %body.session_id,
            "Initialized chat session"
        );
        *self.session_id.write() = Some(body.session_id.clone());
        Ok(body.session_id)
    }

    /// Clear the server-side conversation of the current session
    pub async fn clear_history(&self) -> Result<(), ClientError> {
        let session_id = self.session_id().ok_or(ClientError::NoSession)?;
        let response = self
            .http
            .post(self.url("/api/chat/clear-history"))
            .json(&SessionBody {
                session_id: Some(&session_id),
            })
            .send()
            .await?;
        check_status(response).await?;

        if let Some(history) = &self.history {
            history.clear_messages(&session_id)?;
        }
        Ok(())
    }

    /// Send one guest message; never fails, falling back to the connection text
    pub async fn send_message(&self, text: &str) -> ChatReply {
        let request_id = concierge_core::new_id();
        let session_id = self.session_id();

        match self.post_message(text, session_id.as_deref(), &request_id).await {
            Ok(body) => {
                let session_id = body.session_id.or(session_id);
                if let Some(id) = &session_id {
                    *self.session_id.write() = Some(id.clone());
                }
                let reply = ChatReply {
                    text: body.message,
                    session_id,
                    origin: ReplyOrigin::Direct,
                    intent: body.intent,
                };
                self.record(text, &reply);
                reply
            }
            Err(ClientError::Timeout) => {
                tracing::warn!(request_id = %request_id, "Message timed out, polling for reply");
                let reply = match self.poll(&request_id).await {
                    PollOutcome::Reply(message, polled_session) => {
                        let session_id = polled_session.or(session_id);
                        if let Some(id) = &session_id {
                            *self.session_id.write() = Some(id.clone());
                        }
                        ChatReply {
                            text: message,
                            session_id,
                            origin: ReplyOrigin::Polled,
                            intent: None,
                        }
                    }
                    PollOutcome::Cancelled => ChatReply {
                        text: String::new(),
                        session_id,
                        origin: ReplyOrigin::Cancelled,
                        intent: None,
                    },
                    PollOutcome::Failed | PollOutcome::Exhausted => ChatReply::fallback(session_id),
                };
                self.record(text, &reply);
                reply
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, "Message request failed: {}", e);
                let reply = ChatReply::fallback(session_id);
                self.record(text, &reply);
                reply
            }
        }
    }

    async fn post_message(
        &self,
        text: &str,
        session_id: Option<&str>,
        request_id: &str,
    ) -> Result<MessageResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/api/chat/message"))
            .timeout(self.config.request_timeout)
            .json(&MessageBody {
                message: text,
                session_id,
                user_id: self.config.user_id.as_deref(),
                request_id,
            })
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn poll(&self, request_id: &str) -> PollOutcome {
        self.polling.lock().insert(request_id.to_string(), true);
        let outcome = self.poll_loop(request_id).await;
        self.polling.lock().remove(request_id);
        outcome
    }

    async fn poll_loop(&self, request_id: &str) -> PollOutcome {
        let url = self.url(&format!("/api/chat/poll/{}", request_id));

        for attempt in 1..=self.config.max_poll_attempts {
            tokio::time::sleep(self.config.poll_interval * attempt).await;
            if !self.is_polling(request_id) {
                tracing::debug!(request_id = %request_id, "Polling cancelled");
                return PollOutcome::Cancelled;
            }

            let body = match self.fetch_poll(&url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(request_id = %request_id, attempt, "Poll failed: {}", e);
                    continue;
                }
            };
            if !self.is_polling(request_id) {
                return PollOutcome::Cancelled;
            }

            match body.status.as_str() {
                "completed" => {
                    if let Some(message) = body.message {
                        return PollOutcome::Reply(message, body.session_id);
                    }
                }
                "failed" => {
                    tracing::warn!(
                        request_id = %request_id,
                        error = ?body.error,
                        "Server reported a failed reply"
                    );
                    return PollOutcome::Failed;
                }
                _ => {}
            }
            tracing::debug!(request_id = %request_id, attempt, status = %body.status, "Reply not ready");
        }

        tracing::warn!(request_id = %request_id, "Gave up polling");
        PollOutcome::Exhausted
    }

    async fn fetch_poll(&self, url: &str) -> Result<PollBody, ClientError> {
        let response = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    fn is_polling(&self, request_id: &str) -> bool {
        self.polling.lock().get(request_id).copied().unwrap_or(false)
    }

    /// Stop polling for one request; returns whether a poll was running
    pub fn cancel_polling(&self, request_id: &str) -> bool {
        match self.polling.lock().get_mut(request_id) {
            Some(active) => {
                *active = false;
                true
            }
            None => false,
        }
    }

    pub fn cancel_all_polling(&self) {
        for active in self.polling.lock().values_mut() {
            *active = false;
        }
    }

    /// Request ids currently being polled
    pub fn active_polls(&self) -> Vec<String> {
        self.polling
            .lock()
            .iter()
            .filter(|(_, active)| **active)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn record(&self, text: &str, reply: &ChatReply) {
        let (Some(history), Some(session_id)) = (&self.history, &reply.session_id) else {
            return;
        };
        let mut result = history.add_message(session_id, ChatMessage::user(text));
        if result.is_ok() && reply.origin != ReplyOrigin::Cancelled {
            result = history.add_message(session_id, ChatMessage::bot(&reply.text));
        }
        if let Err(e) = result {
            tracing::warn!(session_id = %session_id, "Failed to record chat history: {}", e);
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body
            .details
            .or(body.error)
            .unwrap_or_else(|| status.to_string()),
        Err(_) => status.to_string(),
    };
    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("http://hotel.local/");
        assert_eq!(config.base_url, "http://hotel.local");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_poll_attempts, 5);
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_cancel_unknown_poll() {
        let client = ChatClient::new(ClientConfig::default()).unwrap();
        assert!(!client.cancel_polling("nope"));
        assert!(client.active_polls().is_empty());
    }

    #[test]
    fn test_cancel_marks_poll_inactive() {
        let client = ChatClient::new(ClientConfig::default()).unwrap();
        client.polling.lock().insert("r1".to_string(), true);
        client.polling.lock().insert("r2".to_string(), true);
        assert_eq!(client.active_polls().len(), 2);

        assert!(client.cancel_polling("r1"));
        assert!(!client.is_polling("r1"));
        assert_eq!(client.active_polls(), vec!["r2".to_string()]);

        client.cancel_all_polling();
        assert!(client.active_polls().is_empty());
    }

    #[test]
    fn test_fallback_reply() {
        let reply = ChatReply::fallback(Some("s".to_string()));
        assert_eq!(reply.text, CONNECTION_FALLBACK);
        assert_eq!(reply.origin, ReplyOrigin::Fallback);
    }
}
