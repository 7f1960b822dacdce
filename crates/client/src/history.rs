//! Local chat history
//!
//! All chats live under one storage key as a map chat id →
//! `{messages, timestamp, title}`; the sidebar state has a key of its own.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use concierge_core::{ChatMessage, ChatSession};

use crate::ClientError;

pub const CHAT_HISTORY_KEY: &str = "chatHistory";
pub const SIDEBAR_COLLAPSED_KEY: &str = "sidebarCollapsed";

/// String key-value storage
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError>;

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;

    fn remove(&self, key: &str) -> Result<(), ClientError>;
}

/// Storage kept in memory only
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.items.write().remove(key);
        Ok(())
    }
}

/// Storage backed by one JSON object file
///
/// Every write rewrites the whole file through a temporary sibling.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, ClientError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_all(&self, items: &HashMap<String, String>) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(items)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let _guard = self.lock.lock();
        let mut items = self.read_all()?;
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        let _guard = self.lock.lock();
        let mut items = self.read_all()?;
        if items.remove(key).is_some() {
            self.write_all(&items)?;
        }
        Ok(())
    }
}

/// Chat sessions persisted in a [`Storage`]
#[derive(Clone)]
pub struct ChatHistoryStore {
    storage: Arc<dyn Storage>,
}

impl ChatHistoryStore {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// All chats; unreadable stored data counts as no history
    pub fn load(&self) -> Result<HashMap<String, ChatSession>, ClientError> {
        let Some(raw) = self.storage.get(CHAT_HISTORY_KEY)? else {
            return Ok(HashMap::new());
        };
        match serde_json::from_str(&raw) {
            Ok(chats) => Ok(chats),
            Err(e) => {
                tracing::warn!("Discarding unreadable chat history: {}", e);
                Ok(HashMap::new())
            }
        }
    }

    fn save(&self, chats: &HashMap<String, ChatSession>) -> Result<(), ClientError> {
        let raw = serde_json::to_string(chats)?;
        self.storage.set(CHAT_HISTORY_KEY, &raw)
    }

    /// Start an empty chat and return its id
    pub fn new_chat(&self) -> Result<String, ClientError> {
        let id = concierge_core::new_id();
        self.insert(&id, ChatSession::new())?;
        Ok(id)
    }

    /// Store a chat under a given id, replacing any previous one
    pub fn insert(&self, chat_id: &str, chat: ChatSession) -> Result<(), ClientError> {
        let mut chats = self.load()?;
        chats.insert(chat_id.to_string(), chat);
        self.save(&chats)
    }

    /// Append a message, creating the chat on its first message
    pub fn add_message(
        &self,
        chat_id: &str,
        message: ChatMessage,
    ) -> Result<ChatSession, ClientError> {
        let mut chats = self.load()?;
        let chat = chats.entry(chat_id.to_string()).or_default();
        chat.push(message);
        let updated = chat.clone();
        self.save(&chats)?;
        Ok(updated)
    }

    pub fn get(&self, chat_id: &str) -> Result<Option<ChatSession>, ClientError> {
        Ok(self.load()?.remove(chat_id))
    }

    /// Chats, most recently updated first
    pub fn list(&self) -> Result<Vec<(String, ChatSession)>, ClientError> {
        let mut chats: Vec<(String, ChatSession)> = self.load()?.into_iter().collect();
        chats.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then(a.0.cmp(&b.0)));
        Ok(chats)
    }

    /// Delete one chat; returns whether it existed
    pub fn delete(&self, chat_id: &str) -> Result<bool, ClientError> {
        let mut chats = self.load()?;
        let existed = chats.remove(chat_id).is_some();
        if existed {
            self.save(&chats)?;
        }
        Ok(existed)
    }

    /// Empty one chat but keep it in the list
    pub fn clear_messages(&self, chat_id: &str) -> Result<(), ClientError> {
        let mut chats = self.load()?;
        if let Some(chat) = chats.get_mut(chat_id) {
            *chat = ChatSession::new();
            self.save(&chats)?;
        }
        Ok(())
    }

    /// Delete every chat
    pub fn clear(&self) -> Result<(), ClientError> {
        self.storage.remove(CHAT_HISTORY_KEY)
    }

    pub fn set_sidebar_collapsed(&self, collapsed: bool) -> Result<(), ClientError> {
        self.storage
            .set(SIDEBAR_COLLAPSED_KEY, if collapsed { "true" } else { "false" })
    }

    pub fn sidebar_collapsed(&self) -> Result<bool, ClientError> {
        Ok(self.storage.get(SIDEBAR_COLLAPSED_KEY)?.as_deref() == Some("true"))
    }
}
