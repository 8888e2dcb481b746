//! Completion gateway: dispatch, response normalization, cost accounting.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::error::GatewayError;
use super::types::{ChatRequest, ChatResponse, Message, Usage};
use crate::config::{ConfigStore, ProviderConfig};
use crate::pricing::PricingTable;

/// Default OpenAI-compatible completions endpoint, used when a config has no
/// `base_url` override.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Canned greeting sent by the connectivity probe.
const PROBE_MESSAGE: &str = "Hello, this is a test message. Please respond with \"OK\".";

/// Outcome of one completion request. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub content: String,
    pub usage: Usage,
    /// Currency units, derived from usage and the pricing table (or the
    /// config's flat fallback rate).
    pub cost: f64,
}

/// Stateless dispatcher for chat completions.
///
/// Each call is an independent transaction: one outbound request, no retries,
/// no shared request state. Dropping the returned future aborts the outbound
/// call; nothing persisted is touched either way.
pub struct CompletionGateway {
    client: Client,
    configs: Arc<ConfigStore>,
    pricing: Arc<PricingTable>,
    timeout: Duration,
}

impl CompletionGateway {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(configs: Arc<ConfigStore>, pricing: Arc<PricingTable>) -> Self {
        Self {
            client: Client::new(),
            configs,
            pricing,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Bound every outbound call by `timeout`. A timeout surfaces as a
    /// transport-class provider error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a completion against the stored config `config_id`.
    pub async fn complete(
        &self,
        config_id: &str,
        messages: Vec<Message>,
    ) -> Result<CompletionResult, GatewayError> {
        let config = self
            .configs
            .get(config_id)
            .await
            .ok_or_else(|| GatewayError::ConfigNotFound(config_id.to_string()))?;
        self.complete_with(&config, messages).await
    }

    /// Run a completion against a config that need not be stored yet.
    pub async fn complete_with(
        &self,
        config: &ProviderConfig,
        messages: Vec<Message>,
    ) -> Result<CompletionResult, GatewayError> {
        let response = self.dispatch(config, messages).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::Protocol("response contained no choices".into()))?;
        let usage = response
            .usage
            .ok_or_else(|| GatewayError::Protocol("response missing usage".into()))?;

        let cost = self.cost_for(config, &usage).await;
        Ok(CompletionResult {
            content,
            usage,
            cost,
        })
    }

    /// Probe a candidate config before it is saved. Collapses every failure
    /// into `false`; callers needing the reason should use `complete_with`.
    pub async fn test_connection(&self, config: &ProviderConfig) -> bool {
        self.complete_with(config, vec![Message::user(PROBE_MESSAGE)])
            .await
            .is_ok()
    }

    async fn dispatch(
        &self,
        config: &ProviderConfig,
        messages: Vec<Message>,
    ) -> Result<ChatResponse, GatewayError> {
        let url = config.base_url.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let request = ChatRequest {
            model: config.model.clone(),
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        debug!(model = %request.model, url, "dispatching chat completion");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", config.api_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(GatewayError::Provider {
                status: Some(status.as_u16()),
                message: provider_message(status.as_u16(), &body),
            });
        }

        serde_json::from_str(&body).map_err(|e| GatewayError::Protocol(e.to_string()))
    }

    async fn cost_for(&self, config: &ProviderConfig, usage: &Usage) -> f64 {
        if self.pricing.get_pricing(&config.model).await.is_some() {
            return self
                .pricing
                .calculate_cost(&config.model, usage.prompt_tokens, usage.completion_tokens)
                .await;
        }
        match config.cost_per_1k_tokens {
            Some(rate) => rate * usage.total_tokens as f64 / 1000.0,
            None => 0.0,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Best available description of a provider rejection: the parsed
/// `error.message` when the body carries one, the raw body otherwise, the
/// bare status for an empty body.
fn provider_message(status: u16, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.message;
    }
    if body.trim().is_empty() {
        return format!("provider returned status {status}");
    }
    body.to_string()
}
