use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::AppError;
use crate::tools::definition::{OperationKind, RiskLevel, ToolDefinition};

/// Registry of the tools the model may call. Built once at startup and
/// shared read-only; per-request tools (navigate) are appended by the
/// executor when it assembles the definitions for a chat turn.
#[derive(Default)]
pub struct ToolCatalog {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        let mut catalog = Self {
            tools: HashMap::new(),
        };
        catalog.register(confirm_action_tool());
        catalog
    }

    pub fn register(&mut self, def: ToolDefinition) {
        self.tools.insert(def.name.clone(), def);
    }

    pub fn register_all(&mut self, defs: Vec<ToolDefinition>) {
        for def in defs {
            self.register(def);
        }
    }

    pub fn get(&self, name: &str) -> Result<&ToolDefinition, AppError> {
        self.tools
            .get(name)
            .ok_or_else(|| AppError::ToolNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list(&self) -> Vec<&ToolDefinition> {
        self.tools.values().collect()
    }

    /// Provider-facing definitions for every registered tool.
    pub fn llm_definitions(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.llm_definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The confirmation tool the model calls after relaying a pending action
/// to the user. Always registered; it never reaches the gateway.
pub fn confirm_action_tool() -> ToolDefinition {
    ToolDefinition {
        name: "confirm_action".to_string(),
        description: "Confirm or cancel a pending action previously proposed to the user. \
                      Call this only after the user has explicitly answered."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "action_id": {
                    "type": "string",
                    "description": "Identifier of the pending action to resolve."
                },
                "confirmed": {
                    "type": "boolean",
                    "description": "true if the user approved the action, false if they declined."
                }
            },
            "required": ["action_id", "confirmed"]
        }),
        operation_kind: OperationKind::Mutation,
        risk_level: RiskLevel::Read,
        graphql: None,
    }
}
