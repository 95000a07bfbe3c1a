use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompatible,
    Mistral,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMRuntimeConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    pub model_id: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

/// Connection settings for the remote GraphQL gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub gateway_url: String,
    /// Service-to-service credential, used when no user token is present.
    pub service_token: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
    /// Disable only for gateways with self-signed certificates.
    #[serde(default = "default_verify_certs")]
    pub verify_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    #[serde(default = "default_pending_action_ttl_secs")]
    pub pending_action_ttl_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_tool_iterations: default_max_tool_iterations(),
            pending_action_ttl_secs: default_pending_action_ttl_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Normalize a gateway URL to its `/graphql` endpoint.
///
/// Users sometimes paste the bare host or a trailing slash; accept both.
pub fn normalize_gateway_url(raw: &str) -> String {
    let base = raw.trim().trim_end_matches('/');
    if base.is_empty() {
        return "/graphql".to_string();
    }
    if base.ends_with("/graphql") {
        return base.to_string();
    }
    match url::Url::parse(base) {
        Ok(parsed) => {
            let path = parsed.path();
            if path.is_empty() || path == "/" {
                format!("{base}/graphql")
            } else {
                base.to_string()
            }
        }
        Err(_) => base.to_string(),
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenaiCompatible
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

fn default_verify_certs() -> bool {
    true
}

fn default_max_tool_iterations() -> u32 {
    10
}

fn default_pending_action_ttl_secs() -> u64 {
    300
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

#[cfg(test)]
mod tests {
    use super::normalize_gateway_url;

    #[test]
    fn bare_host_gets_graphql_path() {
        assert_eq!(
            normalize_gateway_url("https://gateway.example.com"),
            "https://gateway.example.com/graphql"
        );
        assert_eq!(
            normalize_gateway_url("https://gateway.example.com/"),
            "https://gateway.example.com/graphql"
        );
    }

    #[test]
    fn explicit_paths_are_preserved() {
        assert_eq!(
            normalize_gateway_url("https://gateway.example.com/graphql"),
            "https://gateway.example.com/graphql"
        );
        assert_eq!(
            normalize_gateway_url("https://gateway.example.com/api/v2"),
            "https://gateway.example.com/api/v2"
        );
    }
}
