//! Bridge between an LLM's tool calls and a remote GraphQL gateway, with
//! a confirm-before-execute guardrail for write operations.
//!
//! The flow: [`agent::AgentLoop`] drives the model, hands each requested
//! tool call to a [`tools::ToolExecutor`], which resolves it through the
//! [`tools::ToolCatalog`] and either builds a GraphQL operation
//! ([`graphql::build_operation`]) or parks it in the
//! [`guardrails::GuardrailStore`] until the user confirms.

pub mod agent;
pub mod config;
pub mod error;
pub mod graphql;
pub mod guardrails;
pub mod llm;
pub mod models;
pub mod routes;
pub mod store;
pub mod tools;

pub use agent::{AgentLoop, ChatOutcome};
pub use config::{AgentConfig, ExecutorConfig, LLMRuntimeConfig, ProviderKind};
pub use error::AppError;
pub use guardrails::GuardrailStore;
pub use tools::{ExecutionContext, GraphqlToolExecutor, LocalToolExecutor, ToolCatalog, ToolExecutor};
