use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AppError;
use crate::tools::definition::ToolDefinition;

/// A rendered GraphQL operation ready to POST to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltOperation {
    pub document: String,
    pub variables: Map<String, Value>,
}

/// Render a GraphQL document and variables from a tool's binding metadata
/// and the flat arguments supplied by the model.
///
/// Unknown argument keys are dropped, never forwarded: the model routinely
/// hallucinates extra parameters and the gateway would reject the whole
/// operation over them. A missing binding is a registration bug and fails
/// loudly instead.
pub fn build_operation(
    def: &ToolDefinition,
    arguments: &Map<String, Value>,
) -> Result<BuiltOperation, AppError> {
    let binding = def
        .graphql
        .as_ref()
        .ok_or_else(|| AppError::MissingBinding(def.name.clone()))?;

    let empty = Map::new();
    let properties = def
        .parameters
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let wrapped_fields: HashSet<&str> = binding
        .input_wrappers
        .iter()
        .flat_map(|w| w.fields.iter().map(String::as_str))
        .collect();

    let mut variables = Map::new();
    let mut declarations: Vec<String> = Vec::new();
    let mut call_args: Vec<String> = Vec::new();

    for (key, value) in arguments {
        if wrapped_fields.contains(key.as_str()) {
            continue;
        }
        let Some(prop) = properties.get(key) else {
            debug!(tool = %def.name, argument = %key, "dropping unknown tool argument");
            continue;
        };

        let camel_key = to_camel_case(key);
        let wire_type = json_type_to_graphql(prop);
        let mut value = value.clone();

        if wire_type.contains("ID") {
            if let Value::String(raw) = &value {
                value = Value::String(to_global_id(key, raw, binding.node_type.as_deref()));
            }
        }

        // Objects like order_by are filtered down to the declared sub-schema;
        // an emptied object is omitted rather than sent as null or {}.
        if let Some(obj) = value.as_object() {
            if let Some(sub) = prop.get("properties").and_then(Value::as_object) {
                let filtered = filter_object_fields(obj, sub);
                if filtered.is_empty() {
                    debug!(tool = %def.name, argument = %key, "object argument emptied by schema filter; omitted");
                    continue;
                }
                value = Value::Object(filtered);
            }
        }

        declarations.push(format!("${camel_key}: {wire_type}"));
        call_args.push(format!("{camel_key}: ${camel_key}"));
        variables.insert(camel_key, value);
    }

    for wrapper in &binding.input_wrappers {
        let mut input_obj = Map::new();
        for field in &wrapper.fields {
            let Some(value) = arguments.get(field) else {
                continue;
            };
            let mut value = value.clone();
            if let Some(prop) = properties.get(field) {
                if json_type_to_graphql(prop).contains("ID") {
                    if let Value::String(raw) = &value {
                        value =
                            Value::String(to_global_id(field, raw, binding.node_type.as_deref()));
                    }
                }
            }
            input_obj.insert(to_camel_case(field), value);
        }
        if input_obj.is_empty() {
            debug!(tool = %def.name, wrapper = %wrapper.param_name, "input wrapper has no supplied fields; omitted");
            continue;
        }
        let camel_param = to_camel_case(&wrapper.param_name);
        declarations.push(format!("${camel_param}: {}", wrapper.graphql_type));
        call_args.push(format!("{camel_param}: ${camel_param}"));
        variables.insert(camel_param, Value::Object(input_obj));
    }

    let return_fields = binding
        .return_fields
        .split_whitespace()
        .map(to_camel_case)
        .collect::<Vec<_>>()
        .join(" ");

    let keyword = def.operation_kind.keyword();
    let operation_name = &binding.operation_name;
    let document = if declarations.is_empty() {
        format!("{keyword} {{ {operation_name} {{ {return_fields} }} }}")
    } else {
        format!(
            "{keyword} ToolExecution({}) {{ {operation_name}({}) {{ {return_fields} }} }}",
            declarations.join(", "),
            call_args.join(", "),
        )
    };

    Ok(BuiltOperation {
        document,
        variables,
    })
}

/// snake_case to camelCase; already-camel input passes through unchanged.
pub fn to_camel_case(input: &str) -> String {
    let mut segments = input.split('_').filter(|s| !s.is_empty());
    let Some(first) = segments.next() else {
        return String::new();
    };
    let mut out = first.to_string();
    for segment in segments {
        out.push_str(&capitalize(segment));
    }
    out
}

/// Encode a raw id as a Relay GlobalID: base64("TypeName:rawId").
///
/// Idempotent: a value that already decodes to a `TypeName:id` pair is
/// passed through unchanged, so the model can echo ids from earlier tool
/// results without double-encoding.
pub fn to_global_id(param_name: &str, value: &str, node_type: Option<&str>) -> String {
    if let Ok(decoded) = BASE64.decode(value) {
        if let Ok(text) = String::from_utf8(decoded) {
            if text.contains(':') && text.contains("Node") {
                debug!(param = %param_name, "value is already a GlobalID; passing through");
                return value.to_string();
            }
        }
    }

    let type_name = match node_type {
        Some(name) => name.to_string(),
        None => {
            // Derive from the parameter name: "user_id" -> "UserNode".
            let base = if param_name == "id" {
                "unknown"
            } else {
                param_name.strip_suffix("_id").unwrap_or(param_name)
            };
            let pascal: String = base.split('_').map(capitalize).collect();
            format!("{pascal}Node")
        }
    };

    let encoded = BASE64.encode(format!("{type_name}:{value}"));
    debug!(param = %param_name, node_type = %type_name, "encoded raw id as GlobalID");
    encoded
}

fn json_type_to_graphql(prop: &Value) -> String {
    if let Some(explicit) = prop.get("_graphql_type").and_then(Value::as_str) {
        return explicit.to_string();
    }
    match prop.get("type").and_then(Value::as_str).unwrap_or("string") {
        "integer" => "Int",
        "number" => "Float",
        "boolean" => "Boolean",
        "array" => "[String]",
        _ => "String",
    }
    .to_string()
}

/// Keep only the keys declared in the sub-schema, accepting both the
/// declared spelling and its snake_case equivalent; kept keys are stored
/// under the declared (camelCase) name.
fn filter_object_fields(obj: &Map<String, Value>, sub_schema: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in obj {
        let camel = to_camel_case(key);
        if sub_schema.contains_key(key) {
            out.insert(key.clone(), value.clone());
        } else if sub_schema.contains_key(&camel) {
            out.insert(camel, value.clone());
        }
    }
    out
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tools::definition::{GraphqlBinding, InputWrapper, OperationKind, RiskLevel};

    fn tool(
        kind: OperationKind,
        operation_name: &str,
        return_fields: &str,
        parameters: Value,
        node_type: Option<&str>,
        input_wrappers: Vec<InputWrapper>,
    ) -> ToolDefinition {
        ToolDefinition {
            name: "test_tool".to_string(),
            description: String::new(),
            parameters,
            operation_kind: kind,
            risk_level: RiskLevel::Read,
            graphql: Some(GraphqlBinding {
                operation_name: operation_name.to_string(),
                return_fields: return_fields.to_string(),
                node_type: node_type.map(|s| s.to_string()),
                input_wrappers,
            }),
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn camel_case_conversion_is_idempotent() {
        assert_eq!(to_camel_case("order_status"), "orderStatus");
        assert_eq!(to_camel_case(&to_camel_case("order_status")), "orderStatus");
        assert_eq!(to_camel_case("status"), "status");
        assert_eq!(to_camel_case("alreadyCamel"), "alreadyCamel");
    }

    #[test]
    fn renders_query_with_variables() {
        let def = tool(
            OperationKind::Query,
            "getOrders",
            "id status",
            json!({"type": "object", "properties": {"status": {"type": "string"}}}),
            None,
            vec![],
        );
        let op = build_operation(&def, &args(json!({"status": "open"}))).unwrap();
        assert_eq!(
            op.document,
            "query ToolExecution($status: String) { getOrders(status: $status) { id status } }"
        );
        assert_eq!(op.variables["status"], json!("open"));
    }

    #[test]
    fn renders_without_operation_name_when_no_variables() {
        let def = tool(
            OperationKind::Query,
            "getProfile",
            "id email",
            json!({"type": "object", "properties": {}}),
            None,
            vec![],
        );
        let op = build_operation(&def, &Map::new()).unwrap();
        assert_eq!(op.document, "query { getProfile { id email } }");
        assert!(op.variables.is_empty());
    }

    #[test]
    fn snake_case_return_fields_are_camel_cased() {
        let def = tool(
            OperationKind::Query,
            "getOrders",
            "id created_at order_status",
            json!({"type": "object", "properties": {}}),
            None,
            vec![],
        );
        let op = build_operation(&def, &Map::new()).unwrap();
        assert!(op.document.contains("{ id createdAt orderStatus }"));
    }

    #[test]
    fn unknown_arguments_are_dropped() {
        let def = tool(
            OperationKind::Query,
            "getOrders",
            "id",
            json!({"type": "object", "properties": {"status": {"type": "string"}}}),
            None,
            vec![],
        );
        let op = build_operation(
            &def,
            &args(json!({"status": "open", "hallucinated": "value"})),
        )
        .unwrap();
        assert!(!op.document.contains("hallucinated"));
        assert!(!op.variables.contains_key("hallucinated"));
    }

    #[test]
    fn missing_binding_fails_loudly() {
        let mut def = tool(
            OperationKind::Query,
            "getOrders",
            "id",
            json!({"type": "object", "properties": {}}),
            None,
            vec![],
        );
        def.graphql = None;
        let err = build_operation(&def, &Map::new()).unwrap_err();
        assert!(matches!(err, AppError::MissingBinding(_)));
    }

    #[test]
    fn global_id_encoding_and_passthrough() {
        let encoded = to_global_id("user_id", "abc-123", Some("UserNode"));
        assert_eq!(encoded, BASE64.encode("UserNode:abc-123"));
        // Re-encoding the result is a no-op.
        assert_eq!(to_global_id("user_id", &encoded, Some("UserNode")), encoded);
    }

    #[test]
    fn global_id_type_derived_from_param_name() {
        assert_eq!(
            to_global_id("client_user_id", "u1", None),
            BASE64.encode("ClientUserNode:u1")
        );
        assert_eq!(to_global_id("id", "u1", None), BASE64.encode("UnknownNode:u1"));
    }

    #[test]
    fn id_arguments_are_global_id_encoded_in_variables() {
        let def = tool(
            OperationKind::Mutation,
            "archiveOrder",
            "id",
            json!({"type": "object", "properties": {"id": {"type": "string", "_graphql_type": "ID!"}}}),
            Some("OrderNode"),
            vec![],
        );
        let op = build_operation(&def, &args(json!({"id": "o-42"}))).unwrap();
        assert_eq!(
            op.document,
            "mutation ToolExecution($id: ID!) { archiveOrder(id: $id) { id } }"
        );
        assert_eq!(op.variables["id"], json!(BASE64.encode("OrderNode:o-42")));
    }

    #[test]
    fn input_wrapper_rebuilds_partial_nested_object() {
        let def = tool(
            OperationKind::Mutation,
            "updateClient",
            "id",
            json!({"type": "object", "properties": {
                "id": {"type": "string", "_graphql_type": "ID!"},
                "first_name": {"type": "string"},
                "last_name": {"type": "string"},
                "email": {"type": "string"}
            }}),
            Some("ClientNode"),
            vec![InputWrapper {
                param_name: "input".to_string(),
                graphql_type: "ClientUpdateInput!".to_string(),
                fields: vec![
                    "first_name".to_string(),
                    "last_name".to_string(),
                    "email".to_string(),
                ],
            }],
        );
        // last_name intentionally absent: it must be omitted, not null.
        let op = build_operation(
            &def,
            &args(json!({"id": "c-7", "first_name": "Ada", "email": "ada@example.com"})),
        )
        .unwrap();
        assert_eq!(
            op.document,
            "mutation ToolExecution($id: ID!, $input: ClientUpdateInput!) { updateClient(id: $id, input: $input) { id } }"
        );
        let input = op.variables["input"].as_object().unwrap();
        assert_eq!(input["firstName"], json!("Ada"));
        assert_eq!(input["email"], json!("ada@example.com"));
        assert!(!input.contains_key("lastName"));
        assert!(!input.contains_key("last_name"));
    }

    #[test]
    fn empty_input_wrapper_is_omitted_entirely() {
        let def = tool(
            OperationKind::Mutation,
            "updateClient",
            "id",
            json!({"type": "object", "properties": {
                "id": {"type": "string", "_graphql_type": "ID!"},
                "email": {"type": "string"}
            }}),
            Some("ClientNode"),
            vec![InputWrapper {
                param_name: "input".to_string(),
                graphql_type: "ClientUpdateInput!".to_string(),
                fields: vec!["email".to_string()],
            }],
        );
        let op = build_operation(&def, &args(json!({"id": "c-7"}))).unwrap();
        assert!(!op.document.contains("$input"));
        assert!(!op.variables.contains_key("input"));
    }

    #[test]
    fn order_by_object_is_filtered_to_declared_fields() {
        let def = tool(
            OperationKind::Query,
            "getOrders",
            "id",
            json!({"type": "object", "properties": {
                "order_by": {"type": "object", "properties": {
                    "createdAt": {"type": "string"},
                    "status": {"type": "string"}
                }}
            }}),
            None,
            vec![],
        );
        let op = build_operation(
            &def,
            &args(json!({"order_by": {"created_at": "desc", "bogus": "asc"}})),
        )
        .unwrap();
        let order_by = op.variables["orderBy"].as_object().unwrap();
        assert_eq!(order_by["createdAt"], json!("desc"));
        assert!(!order_by.contains_key("bogus"));
    }

    #[test]
    fn order_by_emptied_by_filter_is_omitted() {
        let def = tool(
            OperationKind::Query,
            "getOrders",
            "id",
            json!({"type": "object", "properties": {
                "order_by": {"type": "object", "properties": {"createdAt": {"type": "string"}}}
            }}),
            None,
            vec![],
        );
        let op = build_operation(&def, &args(json!({"order_by": {"bogus": "asc"}}))).unwrap();
        assert_eq!(op.document, "query { getOrders { id } }");
        assert!(!op.variables.contains_key("orderBy"));
    }
}
