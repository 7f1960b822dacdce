//! Chat client against a stub server

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use concierge_client::{
    ChatClient, ChatHistoryStore, ClientConfig, ReplyOrigin, CONNECTION_FALLBACK,
};

#[derive(Default)]
struct Stub {
    /// Delay before the message endpoint answers
    message_delay: Duration,
    /// Poll answer once the reply is ready; `None` keeps it pending
    ready_reply: Option<String>,
    /// Polls answered "pending" before the reply becomes ready
    pending_polls: usize,
    polls: usize,
    request_ids: Vec<String>,
    sessions_created: usize,
}

type Shared = Arc<Mutex<Stub>>;

async fn message(State(stub): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let delay = {
        let mut stub = stub.lock();
        if let Some(id) = body["requestId"].as_str() {
            stub.request_ids.push(id.to_string());
        }
        stub.message_delay
    };
    tokio::time::sleep(delay).await;

    let session = body["sessionId"].as_str().unwrap_or("stub-session");
    Json(json!({
        "message": format!("Eco: {}", body["message"].as_str().unwrap_or_default()),
        "sessionId": session,
        "intent": "general",
        "source": "llm",
    }))
}

async fn poll(State(stub): State<Shared>, Path(request_id): Path<String>) -> Json<Value> {
    let mut stub = stub.lock();
    stub.polls += 1;
    let ready = stub.polls > stub.pending_polls;
    match (&stub.ready_reply, ready) {
        (Some(reply), true) => Json(json!({
            "requestId": request_id,
            "status": "completed",
            "message": reply,
            "sessionId": "stub-session",
        })),
        _ => Json(json!({ "requestId": request_id, "status": "pending" })),
    }
}

async fn init_session(State(stub): State<Shared>) -> Json<Value> {
    let mut stub = stub.lock();
    stub.sessions_created += 1;
    Json(json!({
        "message": "Nuova sessione inizializzata",
        "sessionId": format!("session-{}", stub.sessions_created),
    }))
}

async fn clear_history(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    match body["sessionId"].as_str() {
        Some(id) => (
            StatusCode::OK,
            Json(json!({ "message": "Cronologia della chat cancellata", "sessionId": id })),
        ),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid request", "details": "Missing required field: sessionId" })),
        ),
    }
}

async fn spawn_stub(stub: Stub) -> (String, Shared) {
    let shared: Shared = Arc::new(Mutex::new(stub));
    let app = Router::new()
        .route("/api/chat/message", post(message))
        .route("/api/chat/poll/:request_id", get(poll))
        .route("/api/chat/init-session", post(init_session))
        .route("/api/chat/clear-history", post(clear_history))
        .with_state(Arc::clone(&shared));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), shared)
}

fn fast_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
        max_poll_attempts: 3,
        ..ClientConfig::new(base_url)
    }
}

#[tokio::test]
async fn test_direct_reply() {
    let (url, stub) = spawn_stub(Stub::default()).await;
    let client = ChatClient::new(fast_config(&url)).unwrap();

    let reply = client.send_message("Ciao").await;
    assert_eq!(reply.origin, ReplyOrigin::Direct);
    assert_eq!(reply.text, "Eco: Ciao");
    assert_eq!(reply.intent.as_deref(), Some("general"));
    assert_eq!(client.session_id().as_deref(), Some("stub-session"));
    assert_eq!(stub.lock().polls, 0);
}

#[tokio::test]
async fn test_timeout_falls_back_to_polling() {
    let (url, stub) = spawn_stub(Stub {
        message_delay: Duration::from_secs(5),
        ready_reply: Some("Il ristorante apre alle 19:30".to_string()),
        pending_polls: 1,
        ..Default::default()
    })
    .await;
    let client = ChatClient::new(fast_config(&url)).unwrap();

    let reply = client.send_message("Orari ristorante?").await;
    assert_eq!(reply.origin, ReplyOrigin::Polled);
    assert_eq!(reply.text, "Il ristorante apre alle 19:30");
    assert_eq!(reply.session_id.as_deref(), Some("stub-session"));

    let stub = stub.lock();
    assert_eq!(stub.polls, 2);
    assert_eq!(stub.request_ids.len(), 1);
    assert!(client.active_polls().is_empty());
}

#[tokio::test]
async fn test_exhausted_polls_yield_fallback() {
    let (url, stub) = spawn_stub(Stub {
        message_delay: Duration::from_secs(5),
        ..Default::default()
    })
    .await;
    let client = ChatClient::new(fast_config(&url)).unwrap();

    let reply = client.send_message("Ciao").await;
    assert_eq!(reply.origin, ReplyOrigin::Fallback);
    assert_eq!(reply.text, CONNECTION_FALLBACK);
    assert_eq!(stub.lock().polls, 3);
}

#[tokio::test]
async fn test_connection_refused_yields_fallback() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ChatClient::new(fast_config(&format!("http://{}", addr))).unwrap();
    let reply = client.send_message("Ciao").await;
    assert_eq!(reply.origin, ReplyOrigin::Fallback);
    assert_eq!(reply.text, CONNECTION_FALLBACK);
}

#[tokio::test]
async fn test_cancel_polling() {
    let (url, stub) = spawn_stub(Stub {
        message_delay: Duration::from_secs(5),
        ..Default::default()
    })
    .await;
    let config = ClientConfig {
        poll_interval: Duration::from_millis(100),
        max_poll_attempts: 10,
        ..fast_config(&url)
    };
    let client = Arc::new(ChatClient::new(config).unwrap());

    let sender = Arc::clone(&client);
    let handle = tokio::spawn(async move { sender.send_message("Ciao").await });

    // Wait until the first poll is scheduled
    let mut request_id = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(id) = client.active_polls().into_iter().next() {
            request_id = Some(id);
            break;
        }
    }
    let request_id = request_id.expect("polling never started");
    assert_eq!(stub.lock().request_ids, vec![request_id.clone()]);
    assert!(client.cancel_polling(&request_id));

    let reply = handle.await.unwrap();
    assert_eq!(reply.origin, ReplyOrigin::Cancelled);
    assert!(reply.text.is_empty());
    assert!(stub.lock().polls < 10);
    assert!(client.active_polls().is_empty());
}

#[tokio::test]
async fn test_session_and_history() {
    let (url, _stub) = spawn_stub(Stub::default()).await;
    let history = ChatHistoryStore::in_memory();
    let client = ChatClient::new(fast_config(&url))
        .unwrap()
        .with_history(history.clone());

    assert!(client.clear_history().await.is_err());

    let first = client.init_session().await.unwrap();
    let second = client.init_session().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(client.session_id().as_deref(), Some(second.as_str()));

    let reply = client.send_message("Quali escursioni ci sono?").await;
    assert_eq!(reply.session_id.as_deref(), Some(second.as_str()));

    let chat = history.get(&second).unwrap().unwrap();
    assert_eq!(chat.messages.len(), 2);
    assert_eq!(chat.title, "Quali escursioni ci sono?");
    assert_eq!(chat.messages[1].text, "Eco: Quali escursioni ci sono?");

    client.clear_history().await.unwrap();
    assert!(history.get(&second).unwrap().unwrap().is_empty());
}
