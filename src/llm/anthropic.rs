use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::AppError;
use crate::llm::provider::{
    estimate_tokens, map_provider_status, map_transport_error, LLMProvider, LLMResponse, Message,
    MessageRole, TokenUsage,
};
use crate::tools::definition::ToolCall;

#[derive(Clone)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, AppError> {
        let base_url = base_url
            .unwrap_or_else(|| "https://api.anthropic.com".to_string())
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key).map_err(|e| AppError::Message(e.to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
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
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    /// Anthropic keeps the system prompt out of the message list and uses
    /// content blocks for tool use, so the shared wire shape is re-mapped.
    fn convert_messages(&self, messages: Vec<Message>) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut out = Vec::new();

        for msg in messages {
            match msg.role {
                MessageRole::System => {
                    if let Some(text) = msg.content {
                        if !text.trim().is_empty() {
                            system_parts.push(text);
                        }
                    }
                }
                MessageRole::User => {
                    out.push(serde_json::json!({
                        "role": "user",
                        "content": [{ "type": "text", "text": msg.content.unwrap_or_default() }]
                    }));
                }
                MessageRole::Assistant => {
                    let mut blocks = Vec::new();
                    if let Some(text) = msg.content {
                        if !text.trim().is_empty() {
                            blocks.push(serde_json::json!({ "type": "text", "text": text }));
                        }
                    }
                    if let Some(tool_calls) = msg.tool_calls {
                        for tc in tool_calls {
                            let input: Value = serde_json::from_str(&tc.arguments)
                                .unwrap_or_else(|_| Value::String(tc.arguments.clone()));
                            blocks.push(serde_json::json!({
                                "type": "tool_use",
                                "id": tc.id,
                                "name": tc.name,
                                "input": input
                            }));
                        }
                    }
                    if blocks.is_empty() {
                        blocks.push(serde_json::json!({ "type": "text", "text": "" }));
                    }
                    out.push(serde_json::json!({ "role": "assistant", "content": blocks }));
                }
                MessageRole::Tool => {
                    let tool_use_id = msg.tool_call_id.unwrap_or_default();
                    out.push(serde_json::json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": tool_use_id,
                            "content": msg.content.unwrap_or_default()
                        }]
                    }));
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, out)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn provider_name(&self) -> &'static str {
        "anthropic"
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
        let (system, converted) = self.convert_messages(messages);
        let tool_defs = tools
            .iter()
            .filter_map(to_anthropic_tool)
            .collect::<Vec<_>>();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": converted,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        if !tool_defs.is_empty() {
            body["tools"] = Value::Array(tool_defs);
        }
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }

        debug!(model = %self.model, "anthropic messages request");

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

        let parsed: AnthropicMessageResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        let mut content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        for block in parsed.content {
            match block.r#type.as_str() {
                "text" => {
                    if let Some(text) = block.text {
                        content.push_str(&text);
                    }
                }
                "tool_use" => {
                    if let (Some(id), Some(name), Some(input)) = (block.id, block.name, block.input)
                    {
                        tool_calls.push(ToolCall {
                            id,
                            name,
                            arguments: input.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        let prompt_tokens = parsed.usage.input_tokens;
        let completion_tokens = parsed.usage.output_tokens;
        let estimated = prompt_tokens.is_none() || completion_tokens.is_none();

        Ok(LLMResponse {
            usage: TokenUsage {
                input_tokens: prompt_tokens.unwrap_or_else(|| estimate_tokens(&body.to_string())),
                output_tokens: completion_tokens.unwrap_or_else(|| estimate_tokens(&content)),
                estimated,
            },
            content,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: parsed.stop_reason,
            tool_calls,
        })
    }
}

/// Re-shape an OpenAI-style function definition into Anthropic's
/// {name, description, input_schema}.
fn to_anthropic_tool(def: &Value) -> Option<Value> {
    let function = def.get("function")?;
    Some(serde_json::json!({
        "name": function.get("name")?,
        "description": function.get("description").cloned().unwrap_or_default(),
        "input_schema": function.get("parameters").cloned().unwrap_or_default(),
    }))
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageResponse {
    model: Option<String>,
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    r#type: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}
