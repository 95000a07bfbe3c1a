use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::AppError;
use crate::models::conversation::{ChatMessage, Conversation};
use crate::store::ConversationStore;

pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(app_name: &str) -> Result<Self, AppError> {
        let db_path = default_sqlite_path(app_name)?;
        Self::with_path(db_path)
    }

    pub fn with_path(db_path: PathBuf) -> Result<Self, AppError> {
        init_db(&db_path)?;
        Ok(Self { db_path })
    }

    fn open(&self) -> Result<Connection, AppError> {
        Ok(Connection::open(&self.db_path)?)
    }

    fn conversation_get(&self, conversation_id: &str) -> Result<Option<Conversation>, AppError> {
        let conn = self.open()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT data_json FROM conversations WHERE id=?1;",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    fn conversation_upsert(&self, conversation: &Conversation) -> Result<(), AppError> {
        let payload = serde_json::to_string(conversation)?;
        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT INTO conversations(id, user_id, data_json, created_at, updated_at)
            VALUES(?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                data_json=excluded.data_json,
                updated_at=excluded.updated_at;
            "#,
            params![
                conversation.id,
                conversation.user_id,
                payload,
                conversation.created_at.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn next_sequence(&self, conversation_id: &str) -> Result<i64, AppError> {
        let conn = self.open()?;
        // MAX() over no rows yields NULL, so coalesce before the increment.
        let next: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM messages WHERE conversation_id=?1;",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(next)
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<Conversation, AppError> {
        if let Some(id) = conversation_id {
            if let Some(existing) = self.conversation_get(id)? {
                if existing.user_id == user_id && existing.archived_at.is_none() {
                    return Ok(existing);
                }
            }
        }
        let conversation = Conversation::new(user_id);
        self.conversation_upsert(&conversation)?;
        Ok(conversation)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        let sequence = self.next_sequence(&message.conversation_id)?;
        let payload = serde_json::to_string(message)?;
        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT INTO messages(id, conversation_id, sequence, data_json, created_at)
            VALUES(?1, ?2, ?3, ?4, ?5);
            "#,
            params![
                message.id,
                message.conversation_id,
                sequence,
                payload,
                message.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    async fn load_history(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT data_json FROM messages WHERE conversation_id=?1 ORDER BY sequence;",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| row.get::<_, String>(0))?;
        let mut messages = Vec::new();
        for row in rows {
            let json = row?;
            let msg: ChatMessage = serde_json::from_str(&json)?;
            messages.push(msg);
        }
        Ok(messages)
    }

    async fn archive_conversation(&self, conversation_id: &str) -> Result<(), AppError> {
        let Some(mut conversation) = self.conversation_get(conversation_id)? else {
            return Ok(());
        };
        let now = Utc::now();
        conversation.archived_at = Some(now);
        conversation.updated_at = now;
        self.conversation_upsert(&conversation)
    }
}

fn init_db(db_path: &Path) -> Result<(), AppError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AppError::Message(e.to_string()))?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;

        CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);
        INSERT INTO schema_version(version)
        SELECT 1
        WHERE NOT EXISTS (SELECT 1 FROM schema_version);

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            data_json TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            sequence INTEGER,
            data_json TEXT NOT NULL,
            created_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation_seq
        ON messages (conversation_id, sequence);
        "#,
    )?;

    Ok(())
}

fn default_sqlite_path(app_name: &str) -> Result<PathBuf, AppError> {
    if let Ok(override_path) = std::env::var("STORE_SQLITE_PATH") {
        let mut path = expand_tilde(PathBuf::from(override_path));
        if path.is_relative() {
            path = std::env::current_dir()
                .map_err(|e| AppError::Message(e.to_string()))?
                .join(path);
        }
        return Ok(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let home = PathBuf::from(home);

    #[cfg(target_os = "macos")]
    {
        return Ok(home
            .join("Library")
            .join("Application Support")
            .join(app_name)
            .join("app.db"));
    }

    #[cfg(target_os = "windows")]
    {
        let base = std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("AppData").join("Local"));
        return Ok(base.join(app_name).join("app.db"));
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let base = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local").join("share"));
        return Ok(base.join(app_name).join("app.db"));
    }
}

fn expand_tilde(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy().to_string();
    if s == "~" {
        return PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()));
    }
    if let Some(rest) = s.strip_prefix("~/") {
        return PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string())).join(rest);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> SqliteStore {
        let path = std::env::temp_dir()
            .join("toolbridge-tests")
            .join(format!("{}.db", Uuid::new_v4()));
        SqliteStore::with_path(path).unwrap()
    }

    #[tokio::test]
    async fn first_message_of_a_conversation_appends() {
        let store = temp_store();
        let conv = store.get_or_create_conversation("u1", None).await.unwrap();

        store
            .append_message(&ChatMessage::user(&conv.id, "hello"))
            .await
            .unwrap();

        let history = store.load_history(&conv.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn messages_come_back_in_append_order() {
        let store = temp_store();
        let conv = store.get_or_create_conversation("u1", None).await.unwrap();

        store
            .append_message(&ChatMessage::user(&conv.id, "first"))
            .await
            .unwrap();
        store
            .append_message(&ChatMessage::assistant(
                &conv.id,
                Some("second".to_string()),
                vec![],
            ))
            .await
            .unwrap();

        let history = store.load_history(&conv.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content.as_deref(), Some("first"));
        assert_eq!(history[1].content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn foreign_conversation_id_starts_a_fresh_one() {
        let store = temp_store();
        let conv = store.get_or_create_conversation("u1", None).await.unwrap();

        let other = store
            .get_or_create_conversation("u2", Some(&conv.id))
            .await
            .unwrap();
        assert_ne!(other.id, conv.id);
        assert_eq!(other.user_id, "u2");

        let same = store
            .get_or_create_conversation("u1", Some(&conv.id))
            .await
            .unwrap();
        assert_eq!(same.id, conv.id);
    }

    #[tokio::test]
    async fn archived_conversations_are_not_reused() {
        let store = temp_store();
        let conv = store.get_or_create_conversation("u1", None).await.unwrap();
        store.archive_conversation(&conv.id).await.unwrap();

        let next = store
            .get_or_create_conversation("u1", Some(&conv.id))
            .await
            .unwrap();
        assert_ne!(next.id, conv.id);
    }
}
