use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use toolbridge::agent::AgentLoop;
use toolbridge::config::{AgentConfig, ExecutorConfig};
use toolbridge::error::AppError;
use toolbridge::graphql::GraphqlClient;
use toolbridge::guardrails::GuardrailStore;
use toolbridge::llm::provider::{LLMProvider, LLMResponse, Message, TokenUsage};
use toolbridge::routes::RouteEntry;
use toolbridge::store::{ConversationStore, MemoryStore};
use toolbridge::tools::definition::ToolCall;
use toolbridge::tools::{ExecutionContext, GraphqlToolExecutor, ToolCatalog};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Provider that answers each turn from a fixed script: first the tool
/// calls, then a closing text message.
struct ScriptedProvider {
    turns: std::sync::Mutex<Vec<LLMResponse>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<LLMResponse>) -> Self {
        Self {
            turns: std::sync::Mutex::new(turns),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "test-model"
    }

    async fn chat_with_tools(
        &self,
        _messages: Vec<Message>,
        _tools: &[Value],
        _temperature: f64,
        _max_tokens: u32,
    ) -> Result<LLMResponse, AppError> {
        let mut turns = self.turns.lock().unwrap();
        assert!(!turns.is_empty(), "provider script exhausted");
        Ok(turns.remove(0))
    }
}

fn tool_turn(id: &str, name: &str, arguments: String) -> LLMResponse {
    LLMResponse {
        content: String::new(),
        usage: TokenUsage::default(),
        model: "test-model".to_string(),
        finish_reason: Some("tool_calls".to_string()),
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }],
    }
}

fn text_turn(content: &str) -> LLMResponse {
    LLMResponse {
        content: content.to_string(),
        usage: TokenUsage::default(),
        model: "test-model".to_string(),
        finish_reason: Some("stop".to_string()),
        tool_calls: vec![],
    }
}

fn build_executor(guardrails: Arc<GuardrailStore>) -> Arc<GraphqlToolExecutor> {
    let client = GraphqlClient::new(&ExecutorConfig {
        gateway_url: "http://127.0.0.1:9".to_string(),
        service_token: "svc".to_string(),
        timeout_secs: 1,
        verify_certs: true,
    })
    .unwrap();
    let mut executor = GraphqlToolExecutor::new(client, guardrails);
    executor.initialize(Arc::new(ToolCatalog::new()));
    Arc::new(executor)
}

fn billing_ctx() -> ExecutionContext {
    ExecutionContext::new("u1").with_routes(vec![RouteEntry {
        path: "/billing".to_string(),
        name: "BillingPage".to_string(),
        webservices: vec![],
    }])
}

fn run_agent(
    provider: Arc<ScriptedProvider>,
    executor: Arc<GraphqlToolExecutor>,
    store: Arc<MemoryStore>,
) -> AgentLoop {
    AgentLoop::new(provider, executor, store, AgentConfig::default())
}

#[tokio::test]
async fn guarded_navigation_roundtrip() {
    init_tracing();

    let guardrails = Arc::new(GuardrailStore::new(300));
    let executor = build_executor(guardrails);
    let store = Arc::new(MemoryStore::new());

    // Turn 1: the model proposes navigation that needs confirmation.
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            "call_1",
            "navigate",
            "{\"path\":\"/billing\",\"continue_action\":true}".to_string(),
        ),
        text_turn("Shall I take you to the billing page?"),
    ]));
    let agent = run_agent(provider, executor.clone(), store.clone());
    let ctx = billing_ctx();
    let first = agent.run(&ctx, None, "open billing").await.unwrap();

    assert!(first.frontend_actions.is_empty());
    assert_eq!(first.tool_results.len(), 1);
    let proposal: Value = serde_json::from_str(&first.tool_results[0].result).unwrap();
    assert_eq!(proposal["status"], "confirmation_required");
    assert_eq!(proposal["preview"]["page_name"], "BillingPage");
    let action_id = proposal["action_id"].as_str().unwrap().to_string();

    // Turn 2: the user said yes; the model confirms the pending action.
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            "call_2",
            "confirm_action",
            format!("{{\"action_id\":\"{action_id}\",\"confirmed\":true}}"),
        ),
        text_turn("Taking you to billing now."),
    ]));
    let agent = run_agent(provider, executor.clone(), store.clone());
    let ctx = billing_ctx();
    let second = agent
        .run(&ctx, Some(&first.conversation_id), "yes")
        .await
        .unwrap();

    assert_eq!(second.frontend_actions.len(), 1);
    assert_eq!(second.frontend_actions[0].path, "/billing");
    assert!(second.frontend_actions[0].continue_action);

    // Turn 3: replaying the same action id fails as not found.
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            "call_3",
            "confirm_action",
            format!("{{\"action_id\":\"{action_id}\",\"confirmed\":true}}"),
        ),
        text_turn("That action is no longer available."),
    ]));
    let agent = run_agent(provider, executor, store.clone());
    let ctx = billing_ctx();
    let third = agent
        .run(&ctx, Some(&first.conversation_id), "do it again")
        .await
        .unwrap();

    assert!(!third.tool_results[0].success);
    assert!(third.frontend_actions.is_empty());

    // The whole exchange is persisted in order on one conversation.
    let history = store.load_history(&first.conversation_id).await.unwrap();
    assert_eq!(history.len(), 12);
}
