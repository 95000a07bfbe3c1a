pub mod catalog;
pub mod definition;
pub mod executor;

pub use catalog::{confirm_action_tool, ToolCatalog};
pub use definition::{
    GraphqlBinding, InputWrapper, OperationKind, RiskLevel, ToolCall, ToolCallRecord,
    ToolDefinition,
};
pub use executor::{
    ExecutionContext, FrontendAction, GraphqlToolExecutor, LocalToolExecutor, ToolExecutor,
};
