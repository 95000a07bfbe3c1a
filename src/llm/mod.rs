pub mod anthropic;
pub mod factory;
pub mod openai_compatible;
pub mod provider;

pub use factory::provider_from_runtime_config;
pub use provider::{LLMProvider, LLMResponse, Message, MessageRole, TokenUsage};
