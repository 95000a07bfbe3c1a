use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Message(String),

    /// The LLM asked for a tool that is not in the catalog.
    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    /// A registered GraphQL-backed tool is missing its binding metadata.
    /// Configuration bug; never recovered at runtime.
    #[error("Tool '{0}' has no GraphQL binding metadata")]
    MissingBinding(String),

    /// A component was used before its `initialize` call.
    #[error("{0} not initialized. Call initialize() first.")]
    NotInitialized(&'static str),

    #[error("Action not found or expired. Please retry the operation.")]
    ActionNotFound,

    #[error("Unauthorized: this action belongs to another user.")]
    ActionForbidden,

    #[error("Invalid API key: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::Message(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        AppError::Message(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Message(value.to_string())
    }
}
