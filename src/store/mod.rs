pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::conversation::{ChatMessage, Conversation};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Persistence boundary for conversations. The agent loop is the only
/// writer; messages are append-only.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch the caller's conversation, or start a fresh one when the id
    /// is absent, unknown, owned by someone else, or archived.
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<Conversation, AppError>;

    async fn append_message(&self, message: &ChatMessage) -> Result<(), AppError>;

    async fn load_history(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, AppError>;

    async fn archive_conversation(&self, conversation_id: &str) -> Result<(), AppError>;
}
