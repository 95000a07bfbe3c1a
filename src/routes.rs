use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::tools::definition::{OperationKind, RiskLevel, ToolDefinition};

/// One navigable frontend route. `webservices` lists the operation names a
/// user must be allowed to call for the route to be useful to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub webservices: Vec<String>,
}

/// Frontend route manifest, produced by the client build and shipped as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesManifest {
    #[serde(default)]
    pub global_webservices: Vec<String>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

impl RoutesManifest {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Keep only the routes whose webservices are all covered by the caller's
/// accessible set. Routes with no webservice requirements are always kept.
pub fn filter_routes_by_permissions(
    routes: &[RouteEntry],
    accessible_webservices: &[String],
) -> Vec<RouteEntry> {
    routes
        .iter()
        .filter(|route| {
            route
                .webservices
                .iter()
                .all(|ws| accessible_webservices.iter().any(|a| a == ws))
        })
        .cloned()
        .collect()
}

/// Build the per-request `navigate` tool definition. The path enum is
/// restricted to what the caller may actually reach, so the model cannot
/// propose navigation to pages the user cannot open.
pub fn build_navigate_tool(accessible_routes: &[RouteEntry]) -> ToolDefinition {
    let paths: Vec<&str> = accessible_routes.iter().map(|r| r.path.as_str()).collect();
    let pages: Vec<String> = accessible_routes
        .iter()
        .map(|r| format!("{} ({})", r.name, r.path))
        .collect();

    ToolDefinition {
        name: "navigate".to_string(),
        description: format!(
            "Navigate the user to a page of the application. Available pages: {}",
            pages.join(", ")
        ),
        parameters: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "enum": paths,
                    "description": "Path of the page to navigate to."
                },
                "continue_action": {
                    "type": "boolean",
                    "description": "Set to true when the navigation is part of a larger action the user must confirm first."
                }
            },
            "required": ["path"]
        }),
        operation_kind: OperationKind::Query,
        risk_level: RiskLevel::Read,
        graphql: None,
    }
}
