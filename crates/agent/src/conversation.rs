//! Conversation memory for one chat session

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use concierge_core::{Turn, TurnRole};

/// Turns kept per session; older ones are dropped first
const MAX_STORED_TURNS: usize = 100;

/// Server-side conversation history
///
/// Methods take `&self` so a conversation can be shared between the session
/// registry and an in-flight request.
#[derive(Debug)]
pub struct Conversation {
    session_id: String,
    turns: RwLock<Vec<Turn>>,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            turns: RwLock::new(Vec::new()),
            created_at: now,
            last_activity: RwLock::new(now),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read()
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Utc::now();
    }

    pub fn add_turn(&self, turn: Turn) {
        self.append([turn]);
    }

    /// Append a guest message and its reply as one step, so concurrent
    /// requests on the same session never interleave their turns
    pub fn add_exchange(&self, user: Turn, assistant: Turn) {
        self.append([user, assistant]);
    }

    fn append(&self, new_turns: impl IntoIterator<Item = Turn>) {
        let mut turns = self.turns.write();
        turns.extend(new_turns);
        if turns.len() > MAX_STORED_TURNS {
            let excess = turns.len() - MAX_STORED_TURNS;
            turns.drain(..excess);
        }
        drop(turns);
        self.touch();
    }

    pub fn add_user_turn(&self, content: &str) {
        self.add_turn(Turn::user(content));
    }

    pub fn add_assistant_turn(&self, content: &str) {
        self.add_turn(Turn::assistant(content));
    }

    /// Copy of the stored turns, oldest first
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.read().clone()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.read().len()
    }

    /// Number of guest messages so far
    pub fn user_turn_count(&self) -> usize {
        self.turns
            .read()
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .count()
    }

    /// Forget all turns; safe on an empty conversation
    pub fn clear(&self) {
        self.turns.write().clear();
        self.touch();
    }
}
