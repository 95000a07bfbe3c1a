use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::graphql::{build_operation, GraphqlClient};
use crate::guardrails::{ConfirmOutcome, GuardrailStore};
use crate::routes::{build_navigate_tool, RouteEntry};
use crate::tools::catalog::ToolCatalog;
use crate::tools::definition::ToolDefinition;

/// Instruction handed back to the client UI instead of (or alongside) a
/// textual answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    #[serde(default)]
    pub continue_action: bool,
}

impl FrontendAction {
    pub fn navigate(path: &str, continue_action: bool) -> Self {
        Self {
            kind: "navigate".to_string(),
            path: path.to_string(),
            continue_action,
        }
    }
}

/// Per-request execution state: who is calling, with what credentials,
/// which routes they may reach, and the frontend actions queued so far.
pub struct ExecutionContext {
    pub user_id: String,
    pub access_token: Option<String>,
    pub accessible_routes: Vec<RouteEntry>,
    frontend_actions: Mutex<Vec<FrontendAction>>,
}

impl ExecutionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: None,
            accessible_routes: Vec::new(),
            frontend_actions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_routes(mut self, routes: Vec<RouteEntry>) -> Self {
        self.accessible_routes = routes;
        self
    }

    pub fn push_frontend_action(&self, action: FrontendAction) {
        self.frontend_actions
            .lock()
            .expect("frontend action mutex poisoned")
            .push(action);
    }

    /// Drain the queued frontend actions into the caller-facing result.
    pub fn take_frontend_actions(&self) -> Vec<FrontendAction> {
        std::mem::take(
            &mut *self
                .frontend_actions
                .lock()
                .expect("frontend action mutex poisoned"),
        )
    }
}

/// One interface, two wirings: tools can resolve in-process or against
/// the remote GraphQL gateway.
///
/// `execute` returns `Ok` with a structured `{"status":"error", ...}`
/// value for anything the model should see and recover from; `Err` is
/// reserved for configuration and programmer errors.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, AppError>;

    /// Provider-facing tool definitions for one chat turn, including the
    /// per-request `navigate` tool when the caller has reachable routes.
    fn tool_definitions(&self, ctx: &ExecutionContext) -> Result<Vec<Value>, AppError>;
}

type LocalHandler = Arc<
    dyn Fn(Map<String, Value>) -> Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send>>
        + Send
        + Sync,
>;

/// Executor for tools that resolve inside this process.
#[derive(Default)]
pub struct LocalToolExecutor {
    catalog: Option<Arc<ToolCatalog>>,
    handlers: HashMap<String, LocalHandler>,
}

impl LocalToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&mut self, catalog: Arc<ToolCatalog>) {
        self.catalog = Some(catalog);
    }

    pub fn register_handler<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
    {
        self.handlers
            .insert(name.to_string(), Arc::new(move |args| Box::pin(handler(args))));
    }
}

#[async_trait]
impl ToolExecutor for LocalToolExecutor {
    async fn execute(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<Value, AppError> {
        if self.catalog.is_none() {
            return Err(AppError::NotInitialized("LocalToolExecutor"));
        }
        let handler = self
            .handlers
            .get(tool_name)
            .ok_or_else(|| AppError::ToolNotFound(tool_name.to_string()))?;
        handler(arguments).await
    }

    fn tool_definitions(&self, _ctx: &ExecutionContext) -> Result<Vec<Value>, AppError> {
        let catalog = self
            .catalog
            .as_ref()
            .ok_or(AppError::NotInitialized("LocalToolExecutor"))?;
        Ok(catalog.llm_definitions())
    }
}

/// Executor for tools bound to remote GraphQL operations, with the
/// guardrail short-circuits for `navigate` and `confirm_action`.
pub struct GraphqlToolExecutor {
    catalog: Option<Arc<ToolCatalog>>,
    client: GraphqlClient,
    guardrails: Arc<GuardrailStore>,
}

impl GraphqlToolExecutor {
    pub fn new(client: GraphqlClient, guardrails: Arc<GuardrailStore>) -> Self {
        Self {
            catalog: None,
            client,
            guardrails,
        }
    }

    pub fn initialize(&mut self, catalog: Arc<ToolCatalog>) {
        self.catalog = Some(catalog);
    }

    fn catalog(&self) -> Result<&Arc<ToolCatalog>, AppError> {
        self.catalog
            .as_ref()
            .ok_or(AppError::NotInitialized("GraphqlToolExecutor"))
    }

    /// Build and run one gateway operation. Remote failures come back as
    /// structured error results the model can react to.
    async fn run_operation(
        &self,
        def: &ToolDefinition,
        arguments: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, AppError> {
        let built = build_operation(def, arguments)?;
        let operation_name = def
            .graphql
            .as_ref()
            .map(|b| b.operation_name.clone())
            .unwrap_or_default();

        match self
            .client
            .execute(&built.document, &built.variables, ctx.access_token.as_deref())
            .await
        {
            Ok(data) => match data.get(&operation_name) {
                Some(result) => Ok(result.clone()),
                None => {
                    warn!(tool = %def.name, operation = %operation_name, "gateway response missing operation field");
                    Ok(error_result(&format!(
                        "Malformed gateway response: missing field '{operation_name}'"
                    )))
                }
            },
            Err(e) => {
                warn!(tool = %def.name, error = %e, "gateway call failed");
                Ok(error_result(&e.to_string()))
            }
        }
    }

    async fn handle_navigate(
        &self,
        arguments: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, AppError> {
        let Some(path) = arguments.get("path").and_then(Value::as_str) else {
            return Ok(error_result("navigate requires a 'path' argument"));
        };
        let continue_action = arguments
            .get("continue_action")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let Some(route) = ctx.accessible_routes.iter().find(|r| r.path == path) else {
            return Ok(error_result(&format!(
                "Path '{path}' is not available to this user"
            )));
        };

        if continue_action {
            let data = json!({
                "is_navigation": true,
                "path": route.path,
                "page_name": route.name,
            });
            let preview = json!({ "path": route.path, "page_name": route.name });
            let pending = self.guardrails.propose(
                &ctx.user_id,
                "navigate",
                arguments.clone(),
                data,
                preview,
            );
            return Ok(json!({
                "status": "confirmation_required",
                "action_id": pending.action_id,
                "message": format!("Please confirm navigation to {}", route.name),
                "preview": pending.preview,
            }));
        }

        ctx.push_frontend_action(FrontendAction::navigate(&route.path, false));
        debug!(path = %route.path, "navigation scheduled");
        Ok(json!({
            "status": "navigation_scheduled",
            "path": route.path,
            "page_name": route.name,
        }))
    }

    async fn handle_confirm(
        &self,
        arguments: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, AppError> {
        let Some(action_id) = arguments.get("action_id").and_then(Value::as_str) else {
            return Ok(error_result("confirm_action requires an 'action_id' argument"));
        };
        let Some(confirmed) = arguments.get("confirmed").and_then(Value::as_bool) else {
            return Ok(error_result("confirm_action requires a 'confirmed' argument"));
        };

        let outcome = match self.guardrails.confirm(action_id, &ctx.user_id, confirmed) {
            Ok(outcome) => outcome,
            Err(e @ (AppError::ActionNotFound | AppError::ActionForbidden)) => {
                return Ok(error_result(&e.to_string()));
            }
            Err(e) => return Err(e),
        };

        match outcome {
            ConfirmOutcome::Rejected => Ok(json!({
                "status": "cancelled",
                "message": "Action cancelled by user.",
            })),
            ConfirmOutcome::Execute {
                tool_name,
                arguments,
                data,
            } => {
                // Pure frontend actions never touch the gateway.
                if data.get("is_navigation").and_then(Value::as_bool) == Some(true) {
                    let path = data.get("path").and_then(Value::as_str).unwrap_or_default();
                    ctx.push_frontend_action(FrontendAction::navigate(path, true));
                    return Ok(json!({
                        "status": "navigation_scheduled",
                        "path": path,
                        "page_name": data.get("page_name").cloned().unwrap_or(Value::Null),
                    }));
                }

                let catalog = self.catalog()?;
                let def = catalog.get(&tool_name)?;
                self.run_operation(def, &arguments, ctx).await
            }
        }
    }
}

#[async_trait]
impl ToolExecutor for GraphqlToolExecutor {
    async fn execute(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, AppError> {
        // Presence check up front so an uninitialized executor fails fast
        // even for the guardrail short-circuits.
        self.catalog()?;

        match tool_name {
            "navigate" => self.handle_navigate(arguments, ctx).await,
            "confirm_action" => self.handle_confirm(arguments, ctx).await,
            _ => {
                let def = self.catalog()?.get(tool_name)?;
                if def.risk_level.requires_confirmation() {
                    let preview = json!({ "changes": arguments });
                    let pending = self.guardrails.propose(
                        &ctx.user_id,
                        tool_name,
                        arguments,
                        json!({ "is_navigation": false }),
                        preview,
                    );
                    return Ok(json!({
                        "status": "confirmation_required",
                        "action_id": pending.action_id,
                        "message": def.risk_level.confirmation_message(tool_name),
                        "preview": pending.preview,
                    }));
                }
                self.run_operation(def, &arguments, ctx).await
            }
        }
    }

    fn tool_definitions(&self, ctx: &ExecutionContext) -> Result<Vec<Value>, AppError> {
        let catalog = self.catalog()?;
        let mut defs = catalog.llm_definitions();
        if !ctx.accessible_routes.is_empty() {
            defs.push(build_navigate_tool(&ctx.accessible_routes).llm_definition());
        }
        Ok(defs)
    }
}

fn error_result(message: &str) -> Value {
    json!({ "status": "error", "message": message })
}
