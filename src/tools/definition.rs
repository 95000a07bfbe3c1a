use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

/// How risky a tool is for the end user's data. Anything that writes
/// requires explicit confirmation before it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Read,
    Create,
    Update,
    Delete,
}

impl RiskLevel {
    pub fn requires_confirmation(&self) -> bool {
        !matches!(self, RiskLevel::Read)
    }

    pub fn confirmation_message(&self, tool_name: &str) -> String {
        match self {
            RiskLevel::Create => format!("Please confirm this creation ({tool_name})"),
            RiskLevel::Update => format!("Please confirm this modification ({tool_name})"),
            RiskLevel::Delete => format!(
                "Please confirm this deletion ({tool_name}) - this may be irreversible"
            ),
            RiskLevel::Read => format!("Please confirm this action ({tool_name})"),
        }
    }
}

/// Metadata for re-nesting flattened tool arguments into a single
/// GraphQL input object before the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputWrapper {
    pub param_name: String,
    pub graphql_type: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphqlBinding {
    pub operation_name: String,
    /// Whitespace-separated selection rendered into the document,
    /// e.g. "id status created_at".
    #[serde(default = "default_return_fields")]
    pub return_fields: String,
    /// Node type name used for GlobalID encoding of `id` arguments.
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub input_wrappers: Vec<InputWrapper>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the flattened parameters. Property schemas may carry
    /// a `_graphql_type` override used by the query builder.
    #[serde(default)]
    pub parameters: Value,
    pub operation_kind: OperationKind,
    #[serde(default = "default_risk_level")]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub graphql: Option<GraphqlBinding>,
}

impl ToolDefinition {
    /// The provider-facing function definition (name, description,
    /// parameter schema only; binding metadata stays server-side).
    pub fn llm_definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// A tool invocation requested by the model. `arguments` stays the raw JSON
/// string from the wire; the agent loop parses it so malformed payloads are
/// a per-call recoverable error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub result: String,
    pub success: bool,
}

fn default_return_fields() -> String {
    "id".to_string()
}

fn default_risk_level() -> RiskLevel {
    RiskLevel::Read
}
