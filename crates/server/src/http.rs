//! HTTP Endpoints
//!
//! REST API for the chat widget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, Json, MatchedPath, Path, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use concierge_agent::ResponseSource;
use concierge_config::ConfigError;
use concierge_text_processing::{BookingIntent, FormattedSection};

use crate::metrics::{metrics_handler, record_chat_latency, record_request};
use crate::pending::PollResponse;
use crate::state::AppState;
use crate::{ApiError, ServerError};

/// Header carrying the chat session id
pub const SESSION_HEADER: &str = "x-session-id";
/// Header carrying the authenticated guest id
pub const USER_HEADER: &str = "x-user-id";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    let timeout = Duration::from_secs(config.server.timeout_seconds);
    drop(config);

    Router::new()
        // Chat
        .route("/api/chat/message", post(send_message))
        .route("/api/chat/clear-history", post(clear_history))
        .route("/api/chat/init-session", post(init_session))
        .route("/api/chat/poll/:request_id", get(poll_response))
        // Reply formatting
        .route("/api/format", post(format_text))
        // Knowledge base
        .route("/api/knowledge", get(get_knowledge))
        .route("/api/knowledge/reload", post(reload_knowledge))
        .route("/api/knowledge/restaurant/hours", put(update_restaurant_hours))
        .route("/api/knowledge/:category", get(get_category))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .route_layer(axum::middleware::from_fn(track_requests))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty, defaults to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    let parsed_origins = if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to localhost:3000");
        vec![HeaderValue::from_static("http://localhost:3000")]
    } else {
        tracing::info!("CORS configured with {} origins", parsed_origins.len());
        parsed_origins
    };

    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(SESSION_HEADER),
            HeaderName::from_static(USER_HEADER),
        ])
}

async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(request).await;
    record_request(&endpoint, response.status().as_u16());
    response
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Chat message request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    message: Option<String>,
    session_id: Option<String>,
    user_id: Option<String>,
    request_id: Option<String>,
}

/// Chat message response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageResponse {
    message: String,
    session_id: String,
    intent: BookingIntent,
    source: ResponseSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

/// POST /api/chat/message
///
/// The agent runs in its own task so the reply still reaches the pending
/// registry when the client gives up waiting and switches to polling.
async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let header_session = header_value(&headers, SESSION_HEADER);
    let Json(request) = body.map_err(|e| ApiError {
        error: ServerError::InvalidRequest(e.body_text()),
        session_id: header_session.clone(),
    })?;

    let session_hint = non_empty(request.session_id).or(header_session);
    let Some(message) = non_empty(request.message) else {
        return Err(ApiError {
            error: ServerError::MissingField("message".to_string()),
            session_id: session_hint,
        });
    };

    let conversation = state.sessions.get_or_create(session_hint.as_deref());
    let session_id = conversation.session_id().to_string();
    let user_id = non_empty(request.user_id).or_else(|| header_value(&headers, USER_HEADER));
    let request_id = non_empty(request.request_id);

    if let Some(request_id) = &request_id {
        state.pending.begin(request_id, &session_id);
    }

    let start = Instant::now();
    let agent = Arc::clone(&state.agent);
    let pending = Arc::clone(&state.pending);
    let task_request_id = request_id.clone();
    let task = tokio::spawn(async move {
        let result = agent
            .process(&conversation, &message, user_id.as_deref())
            .await;
        if let Some(request_id) = &task_request_id {
            match &result {
                Ok(response) => pending.complete(request_id, &response.message),
                Err(e) => pending.fail(request_id, &e.to_string()),
            }
        }
        result
    });

    let result = task.await.map_err(|e| {
        ServerError::Internal(format!("chat task failed: {}", e)).in_session(&session_id)
    })?;
    record_chat_latency(start.elapsed().as_secs_f64());
    let response = result.map_err(|e| ServerError::from(e).in_session(&session_id))?;

    Ok(Json(SendMessageResponse {
        message: response.message,
        session_id,
        intent: response.intent,
        source: response.source,
        request_id,
    }))
}

/// Body carrying an optional session id
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest {
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    message: String,
    session_id: String,
}

fn requested_session(headers: &HeaderMap, body: Option<Json<SessionRequest>>) -> Option<String> {
    non_empty(body.and_then(|Json(b)| b.session_id)).or_else(|| header_value(headers, SESSION_HEADER))
}

/// POST /api/chat/clear-history
async fn clear_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<SessionRequest>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session_id = requested_session(&headers, body)
        .ok_or_else(|| ServerError::MissingField("sessionId".to_string()))?;

    match state.sessions.get(&session_id) {
        Some(conversation) => conversation.clear(),
        None => tracing::debug!(session_id = %session_id, "Clear requested for unknown session"),
    }

    Ok(Json(SessionResponse {
        message: "Cronologia della chat cancellata".to_string(),
        session_id,
    }))
}

/// POST /api/chat/init-session
///
/// Drops the old session, if any, and hands out a new id.
async fn init_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<SessionRequest>>,
) -> Json<SessionResponse> {
    if let Some(old_id) = requested_session(&headers, body) {
        state.sessions.remove(&old_id);
    }
    let conversation = state.sessions.create();

    Json(SessionResponse {
        message: "Nuova sessione inizializzata".to_string(),
        session_id: conversation.session_id().to_string(),
    })
}

/// GET /api/chat/poll/:request_id
async fn poll_response(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Json<PollResponse> {
    Json(state.pending.poll(&request_id))
}

#[derive(Debug, Deserialize)]
struct FormatRequest {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct FormatResponse {
    html: String,
    sections: Vec<FormattedSection>,
}

/// POST /api/format
async fn format_text(
    State(state): State<AppState>,
    body: Result<Json<FormatRequest>, JsonRejection>,
) -> Result<Json<FormatResponse>, ServerError> {
    let Json(request) = body.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
    let text = request
        .text
        .ok_or_else(|| ServerError::MissingField("text".to_string()))?;

    let formatted = state.formatter.format(&text);
    Ok(Json(FormatResponse {
        html: formatted.to_html(),
        sections: formatted.sections,
    }))
}

/// GET /api/knowledge
async fn get_knowledge(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.knowledge.snapshot().to_value())
}

/// GET /api/knowledge/:category
async fn get_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state
        .knowledge
        .category(&category)
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("knowledge category '{}'", category)))
}

#[derive(Debug, Deserialize)]
struct HoursRequest {
    hours: Option<serde_json::Value>,
}

/// PUT /api/knowledge/restaurant/hours
async fn update_restaurant_hours(
    State(state): State<AppState>,
    body: Result<Json<HoursRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let Json(request) = body.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
    let hours = request
        .hours
        .ok_or_else(|| ServerError::MissingField("hours".to_string()))?;

    match state.knowledge.update_restaurant_hours(hours) {
        Ok(restaurant) => Ok(Json(restaurant)),
        Err(ConfigError::CategoryNotFound(name)) => {
            Err(ServerError::NotFound(format!("knowledge category '{}'", name)))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /api/knowledge/reload
async fn reload_knowledge(State(state): State<AppState>) -> Json<serde_json::Value> {
    let categories = state.knowledge.reload();
    Json(serde_json::json!({ "categories": categories }))
}

/// Liveness plus a summary of what the concierge can answer from
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let categories = state.knowledge.snapshot().categories();

    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "knowledge": {
                "status": if categories.is_empty() { "empty" } else { "ok" },
                "categories": categories,
            },
            "llm": {
                "status": if state.agent.has_llm() { "configured" } else { "disabled" },
            },
            "sessions": {
                "active": state.sessions.count(),
                "pending": state.pending.len(),
            },
        }
    }))
}

/// Ready once the knowledge base has data to ground replies on
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let ready = !state.knowledge.snapshot().is_empty();
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
        })),
    )
}
