use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::AppError;
use crate::llm::provider::{
    estimate_tokens, map_provider_status, map_transport_error, LLMProvider, LLMResponse, Message,
    TokenUsage,
};
use crate::tools::definition::ToolCall;

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MISTRAL_DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";

/// Provider speaking the OpenAI chat-completions dialect. Also covers
/// Mistral, whose API is wire-compatible.
#[derive(Clone)]
pub struct OpenAICompatibleProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
    name: &'static str,
}

impl OpenAICompatibleProvider {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, AppError> {
        Self::build("openai_compatible", OPENAI_DEFAULT_BASE_URL, api_key, model, base_url, timeout_secs)
    }

    pub fn mistral(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, AppError> {
        Self::build("mistral", MISTRAL_DEFAULT_BASE_URL, api_key, model, base_url, timeout_secs)
    }

    fn build(
        name: &'static str,
        default_base_url: &str,
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, AppError> {
        let base_url = normalize_base_url(base_url, default_base_url);
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| AppError::Message(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Message(e.to_string()))?;

        Ok(Self {
            client,
            model,
            base_url,
            name,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    fn provider_name(&self) -> &'static str {
        self.name
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat_with_tools(
        &self,
        messages: Vec<Message>,
        tools: &[Value],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<LLMResponse, AppError> {
        let wire_messages = messages
            .into_iter()
            .map(to_openai_message)
            .collect::<Vec<_>>();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": wire_messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = Value::String("auto".to_string());
        }

        debug!(provider = %self.name, model = %self.model, "chat completion request");

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "".to_string());
            return Err(map_provider_status(status, &text));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        let choice = parsed
            .choices
            .first()
            .ok_or_else(|| AppError::Provider("No choices in response".to_string()))?;
        let content = choice.message.content.clone().unwrap_or_default();

        // Arguments stay the raw wire string; the agent loop parses them
        // so malformed JSON is a per-call recoverable error.
        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let prompt_tokens = parsed.usage.as_ref().and_then(|u| u.prompt_tokens);
        let completion_tokens = parsed.usage.as_ref().and_then(|u| u.completion_tokens);
        let estimated = prompt_tokens.is_none() || completion_tokens.is_none();

        Ok(LLMResponse {
            usage: TokenUsage {
                input_tokens: prompt_tokens.unwrap_or_else(|| estimate_tokens(&body.to_string())),
                output_tokens: completion_tokens.unwrap_or_else(|| estimate_tokens(&content)),
                estimated,
            },
            content,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: choice.finish_reason.clone(),
            tool_calls,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

fn to_openai_message(msg: Message) -> Value {
    let mut out = serde_json::Map::new();
    out.insert(
        "role".to_string(),
        Value::String(msg.role.as_str().to_string()),
    );
    out.insert(
        "content".to_string(),
        msg.content.map(Value::String).unwrap_or(Value::Null),
    );

    if let Some(tool_call_id) = msg.tool_call_id {
        out.insert("tool_call_id".to_string(), Value::String(tool_call_id));
    }

    if let Some(tool_calls) = msg.tool_calls {
        let mapped = tool_calls
            .into_iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": { "name": tc.name, "arguments": tc.arguments }
                })
            })
            .collect::<Vec<_>>();
        out.insert("tool_calls".to_string(), Value::Array(mapped));
    }

    Value::Object(out)
}

/// Users sometimes paste the bare host or the full completions endpoint;
/// accept both. Only append /v1 when no path was provided.
pub fn normalize_base_url(base_url: Option<String>, default_url: &str) -> String {
    let Some(mut base) = base_url else {
        return default_url.to_string();
    };
    base = base.trim().to_string();
    if base.is_empty() {
        return default_url.to_string();
    }

    let trimmed = base.trim_end_matches('/');
    if let Some(stripped) = trimmed.strip_suffix("/chat/completions") {
        base = stripped.to_string();
    }

    match url::Url::parse(&base) {
        Ok(parsed) => {
            let path = parsed.path();
            if path.is_empty() || path == "/" {
                format!("{}/v1", base.trim_end_matches('/'))
            } else {
                base.trim_end_matches('/').to_string()
            }
        }
        Err(_) => base.trim_end_matches('/').to_string(),
    }
}
