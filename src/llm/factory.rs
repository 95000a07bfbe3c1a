use std::sync::Arc;

use crate::config::{LLMRuntimeConfig, ProviderKind};
use crate::error::AppError;
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::openai_compatible::OpenAICompatibleProvider;
use crate::llm::provider::LLMProvider;

pub fn provider_from_runtime_config(
    cfg: &LLMRuntimeConfig,
) -> Result<Arc<dyn LLMProvider>, AppError> {
    if cfg.api_key.trim().is_empty() {
        return Err(AppError::Message(
            "Model config is missing api_key".to_string(),
        ));
    }

    let provider: Arc<dyn LLMProvider> = match &cfg.provider {
        ProviderKind::OpenaiCompatible => Arc::new(OpenAICompatibleProvider::new(
            cfg.api_key.clone(),
            cfg.model_id.clone(),
            cfg.base_url.clone(),
            cfg.timeout_secs,
        )?),
        ProviderKind::Mistral => Arc::new(OpenAICompatibleProvider::mistral(
            cfg.api_key.clone(),
            cfg.model_id.clone(),
            cfg.base_url.clone(),
            cfg.timeout_secs,
        )?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            cfg.api_key.clone(),
            cfg.model_id.clone(),
            cfg.base_url.clone(),
            cfg.timeout_secs,
        )?),
    };

    Ok(provider)
}
