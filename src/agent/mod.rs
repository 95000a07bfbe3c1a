use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::AppError;
use crate::llm::provider::{LLMProvider, LLMResponse, Message};
use crate::models::conversation::ChatMessage;
use crate::store::ConversationStore;
use crate::tools::definition::ToolCallRecord;
use crate::tools::executor::{ExecutionContext, FrontendAction, ToolExecutor};

const MAX_ITERATIONS_MESSAGE: &str =
    "Maximum tool iterations reached. Please try a simpler request.";

/// Caller-facing result of one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub content: String,
    pub conversation_id: String,
    pub tool_calls_count: u32,
    pub tool_results: Vec<ToolCallRecord>,
    #[serde(default)]
    pub frontend_actions: Vec<FrontendAction>,
}

/// Drives the model/tool conversation for one user turn.
///
/// Persistence ordering is part of the contract: the user message is
/// stored before the first model call, and every assistant/tool message
/// is stored in the order it is appended, so a crash mid-loop leaves a
/// consistent prefix of the conversation.
pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    executor: Arc<dyn ToolExecutor>,
    store: Arc<dyn ConversationStore>,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        executor: Arc<dyn ToolExecutor>,
        store: Arc<dyn ConversationStore>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            executor,
            store,
            config,
        }
    }

    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        conversation_id: Option<&str>,
        user_message: &str,
    ) -> Result<ChatOutcome, AppError> {
        let conversation = self
            .store
            .get_or_create_conversation(&ctx.user_id, conversation_id)
            .await?;
        let history = self.store.load_history(&conversation.id).await?;

        let user_row = ChatMessage::user(&conversation.id, user_message);
        self.store.append_message(&user_row).await?;

        let mut messages: Vec<Message> = Vec::with_capacity(history.len() + 2);
        if !self.config.system_prompt.trim().is_empty() {
            messages.push(Message::system(self.config.system_prompt.clone()));
        }
        messages.extend(history.iter().map(ChatMessage::to_wire));
        messages.push(user_row.to_wire());

        let tools = self.executor.tool_definitions(ctx)?;

        let mut tool_results: Vec<ToolCallRecord> = Vec::new();
        let mut tool_calls_count: u32 = 0;

        for iteration in 1..=self.config.max_tool_iterations {
            let started = Instant::now();
            let response = self.call_model(messages.clone(), &tools).await?;
            let latency_ms = started.elapsed().as_millis() as u64;

            debug!(
                iteration,
                tool_calls = response.tool_calls.len(),
                latency_ms,
                "model turn complete"
            );

            let assistant_row = ChatMessage::assistant(
                &conversation.id,
                (!response.content.is_empty()).then(|| response.content.clone()),
                response.tool_calls.clone(),
            )
            .with_usage(
                self.provider.provider_name(),
                &response.model,
                response.usage.input_tokens,
                response.usage.output_tokens,
                latency_ms,
            );
            self.store.append_message(&assistant_row).await?;
            messages.push(assistant_row.to_wire());

            if response.tool_calls.is_empty() {
                return Ok(ChatOutcome {
                    content: response.content,
                    conversation_id: conversation.id,
                    tool_calls_count,
                    tool_results,
                    frontend_actions: ctx.take_frontend_actions(),
                });
            }

            // Sequential on purpose: later calls may depend on state the
            // earlier ones just mutated.
            for call in &response.tool_calls {
                tool_calls_count += 1;
                let (result, success) = self.run_tool_call(&call.name, &call.arguments, ctx).await?;

                let tool_row = ChatMessage::tool(&conversation.id, &call.id, result.clone());
                self.store.append_message(&tool_row).await?;
                messages.push(tool_row.to_wire());

                tool_results.push(ToolCallRecord {
                    tool_name: call.name.clone(),
                    result: result.to_string(),
                    success,
                });
            }
        }

        info!(
            conversation_id = %conversation.id,
            max = self.config.max_tool_iterations,
            "tool iteration budget exhausted"
        );
        let final_row = ChatMessage::assistant(
            &conversation.id,
            Some(MAX_ITERATIONS_MESSAGE.to_string()),
            vec![],
        );
        self.store.append_message(&final_row).await?;

        Ok(ChatOutcome {
            content: MAX_ITERATIONS_MESSAGE.to_string(),
            conversation_id: conversation.id,
            tool_calls_count,
            tool_results,
            frontend_actions: ctx.take_frontend_actions(),
        })
    }

    /// Rate limits and timeouts get one retry; everything else propagates.
    async fn call_model(
        &self,
        messages: Vec<Message>,
        tools: &[Value],
    ) -> Result<LLMResponse, AppError> {
        match self
            .provider
            .chat_with_tools(
                messages.clone(),
                tools,
                self.config.temperature,
                self.config.max_tokens,
            )
            .await
        {
            Ok(response) => Ok(response),
            Err(e @ (AppError::RateLimit(_) | AppError::Timeout(_))) => {
                warn!(error = %e, "model call failed, retrying once");
                self.provider
                    .chat_with_tools(messages, tools, self.config.temperature, self.config.max_tokens)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Execute one tool call. Input and execution problems come back as a
    /// structured result for the model; only configuration errors escape.
    async fn run_tool_call(
        &self,
        tool_name: &str,
        raw_arguments: &str,
        ctx: &ExecutionContext,
    ) -> Result<(Value, bool), AppError> {
        let arguments: Map<String, Value> = if raw_arguments.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str(raw_arguments) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!(tool = %tool_name, "malformed tool call arguments");
                    return Ok((
                        error_result(&format!(
                            "Invalid arguments for tool '{tool_name}': expected a JSON object"
                        )),
                        false,
                    ));
                }
            }
        };

        match self.executor.execute(tool_name, arguments, ctx).await {
            Ok(result) => {
                let success = result.get("status").and_then(Value::as_str) != Some("error");
                Ok((result, success))
            }
            Err(e @ AppError::ToolNotFound(_)) => Ok((error_result(&e.to_string()), false)),
            Err(e @ (AppError::NotInitialized(_) | AppError::MissingBinding(_))) => Err(e),
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "tool execution failed");
                Ok((
                    error_result(&format!("Tool '{tool_name}' failed to execute.")),
                    false,
                ))
            }
        }
    }
}

fn error_result(message: &str) -> Value {
    serde_json::json!({ "status": "error", "message": message })
}
