use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::llm::provider::{Message, MessageRole};
use crate::tools::definition::ToolCall;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }
}

/// One persisted conversation message. Append-only: rows are written once
/// by the agent loop and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens_in: Option<u32>,
    #[serde(default)]
    pub tokens_out: Option<u32>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn base(conversation_id: &str, role: MessageRole) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: None,
            tool_calls: None,
            tool_call_id: None,
            tool_result: None,
            provider: None,
            model: None,
            tokens_in: None,
            tokens_out: None,
            latency_ms: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(conversation_id: &str, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::base(conversation_id, MessageRole::User)
        }
    }

    pub fn assistant(
        conversation_id: &str,
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            content,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            ..Self::base(conversation_id, MessageRole::Assistant)
        }
    }

    pub fn tool(conversation_id: &str, tool_call_id: &str, result: Value) -> Self {
        Self {
            content: Some(result.to_string()),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_result: Some(result),
            ..Self::base(conversation_id, MessageRole::Tool)
        }
    }

    pub fn with_usage(
        mut self,
        provider: &str,
        model: &str,
        tokens_in: u32,
        tokens_out: u32,
        latency_ms: u64,
    ) -> Self {
        self.provider = Some(provider.to_string());
        self.model = Some(model.to_string());
        self.tokens_in = Some(tokens_in);
        self.tokens_out = Some(tokens_out);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Rebuild the provider wire message from the stored row.
    pub fn to_wire(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
            tool_call_id: self.tool_call_id.clone(),
            tool_calls: self.tool_calls.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_messages_carry_result_and_call_id() {
        let msg = ChatMessage::tool("c1", "call_1", json!({"id": "1", "status": "open"}));
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(msg.content.as_deref().unwrap().contains("open"));

        let wire = msg.to_wire();
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn assistant_without_tool_calls_stores_none() {
        let msg = ChatMessage::assistant("c1", Some("hello".to_string()), vec![]);
        assert!(msg.tool_calls.is_none());
    }
}
