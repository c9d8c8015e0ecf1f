//! Chat registry
//!
//! Persistent per-chat records: the binding to a backend server (URL and
//! session token) and the chat's preferences. `ChatRegistry` is the storage
//! seam; the in-memory implementation backs tests and single-process runs.

use crate::models::{ChatBinding, ChatPreferences};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[async_trait::async_trait]
pub trait ChatRegistry: Send + Sync {
    /// The chat's backend binding, if it has completed registration.
    async fn binding(&self, chat_id: i64) -> Result<Option<ChatBinding>>;

    /// Stores a binding. Must complete before the chat is treated as
    /// registered anywhere else.
    async fn register(&self, binding: ChatBinding) -> Result<()>;

    /// The chat's preferences, falling back to defaults for unknown chats.
    async fn preferences(&self, chat_id: i64) -> Result<ChatPreferences>;

    async fn update_preferences(&self, preferences: ChatPreferences) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryChatRegistry {
    bindings: Arc<RwLock<HashMap<i64, ChatBinding>>>,
    preferences: Arc<RwLock<HashMap<i64, ChatPreferences>>>,
}

impl InMemoryChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ChatRegistry for InMemoryChatRegistry {
    async fn binding(&self, chat_id: i64) -> Result<Option<ChatBinding>> {
        Ok(self.bindings.read().await.get(&chat_id).cloned())
    }

    async fn register(&self, binding: ChatBinding) -> Result<()> {
        info!(chat_id = binding.chat_id, api_url = %binding.api_url, "Chat registered");
        self.bindings.write().await.insert(binding.chat_id, binding);
        Ok(())
    }

    async fn preferences(&self, chat_id: i64) -> Result<ChatPreferences> {
        Ok(self
            .preferences
            .read()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_else(|| ChatPreferences::new(chat_id)))
    }

    async fn update_preferences(&self, preferences: ChatPreferences) -> Result<()> {
        self.preferences
            .write()
            .await
            .insert(preferences.chat_id, preferences);
        Ok(())
    }
}
