use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{normalize_gateway_url, ExecutorConfig};
use crate::error::AppError;

/// Thin HTTP client for the remote GraphQL gateway.
///
/// Per-request auth: the end user's access token when one is attached to
/// the conversation, otherwise the service token.
#[derive(Clone)]
pub struct GraphqlClient {
    client: reqwest::Client,
    endpoint: String,
    service_token: String,
}

impl GraphqlClient {
    pub fn new(config: &ExecutorConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_certs)
            .build()
            .map_err(|e| AppError::Message(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: normalize_gateway_url(&config.gateway_url),
            service_token: config.service_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST one operation and return its `data` payload. GraphQL-level
    /// errors are flattened into a single message so callers can surface
    /// them as a recoverable tool result.
    pub async fn execute(
        &self,
        document: &str,
        variables: &Map<String, Value>,
        access_token: Option<&str>,
    ) -> Result<Value, AppError> {
        let token = access_token.unwrap_or(&self.service_token);
        let body = serde_json::json!({
            "query": document,
            "variables": variables,
        });

        debug!(endpoint = %self.endpoint, "executing GraphQL operation");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(e.to_string())
                } else {
                    AppError::Message(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "".to_string());
            return Err(AppError::Message(format!("Gateway error: {status} {text}")));
        }

        let parsed: GraphqlResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Message(e.to_string()))?;

        if let Some(errors) = parsed.errors {
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(AppError::Message(format!("GraphQL error: {joined}")));
            }
        }

        Ok(parsed.data.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}
