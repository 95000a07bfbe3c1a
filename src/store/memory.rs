use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::AppError;
use crate::models::conversation::{ChatMessage, Conversation};
use crate::store::ConversationStore;

/// In-memory store, used by tests and embedded callers that do not need
/// conversations to survive a restart.
#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<String, Conversation>>,
    messages: Mutex<Vec<ChatMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<Conversation, AppError> {
        let mut conversations = self.conversations.lock().expect("store mutex poisoned");
        if let Some(id) = conversation_id {
            if let Some(existing) = conversations.get(id) {
                if existing.user_id == user_id && existing.archived_at.is_none() {
                    return Ok(existing.clone());
                }
            }
        }
        let conversation = Conversation::new(user_id);
        conversations.insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        self.messages
            .lock()
            .expect("store mutex poisoned")
            .push(message.clone());
        Ok(())
    }

    async fn load_history(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        Ok(self
            .messages
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn archive_conversation(&self, conversation_id: &str) -> Result<(), AppError> {
        let mut conversations = self.conversations.lock().expect("store mutex poisoned");
        if let Some(conversation) = conversations.get_mut(conversation_id) {
            let now = Utc::now();
            conversation.archived_at = Some(now);
            conversation.updated_at = now;
        }
        Ok(())
    }
}
