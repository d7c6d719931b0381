//! OpenAI-compatible LLM client implementation
//!
//! Provides an async HTTP client for `/chat/completions` with:
//! - Provider presets resolved from configuration
//! - Status code mapping onto Cognitive Weaver errors
//! - Rate limit wait extraction (`Retry-After` header or JSON body)
//!
//! The client sends exactly one request per call. Retrying is the job of the
//! relationship oracle, which owns the retry policy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::RETRY_AFTER;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::transport::CompletionTransport;
use super::types::{ChatRequest, ChatResponse, LlmResponse, Message};

/// Wait assumed when a 429 carries no hint
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 60;

/// OpenAI-compatible LLM client
///
/// Thread-safe client for making chat completion requests.
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("provider", &self.config.provider)
            .field("default_model", &self.config.default_model)
            .finish()
    }
}

/// Builder for creating an LlmClient
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl Default for LlmClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            api_key: None,
            base_url: None,
            timeout_secs: None,
        }
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL (defaults to the configured provider's endpoint)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the LlmClient
    pub fn build(self) -> Result<LlmClient> {
        let config = self.config.unwrap_or_default();
        let api_key = self
            .api_key
            .ok_or_else(|| Error::LLMError("API key is required".to_string()))?;

        let base_url = match self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => config
                .resolved_base_url()
                .map_err(|e| Error::ConfigError(e.to_string()))?,
        };

        let timeout_secs = self.timeout_secs.unwrap_or(config.timeout_secs);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(LlmClient {
            http_client,
            config,
            api_key,
            base_url,
        })
    }
}

impl LlmClient {
    /// Create a new LlmClient with the given configuration and API key
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        LlmClientBuilder::new()
            .config(config)
            .api_key(api_key)
            .build()
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a single chat completion request
    pub async fn complete(&self, messages: Vec<Message>, model: Option<&str>) -> Result<LlmResponse> {
        let model = model.unwrap_or(&self.config.default_model);

        let request = ChatRequest::new(model, messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        self.send_request(&request).await
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "Cognitive Weaver")
            .json(request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), retry_after, &body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse response: {}", e)))?;

        LlmResponse::from_chat_response(chat_response)
            .ok_or_else(|| Error::LLMError("Empty response from API".to_string()))
    }
}

#[async_trait]
impl CompletionTransport for LlmClient {
    async fn complete(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        LlmClient::complete(self, messages, None).await
    }
}

/// Map a non-success HTTP status onto an error
fn status_error(status: u16, retry_after: Option<u64>, body: &str) -> Error {
    let message = match status {
        401 => "Unauthorized: Invalid API key. Set WEAVER_API_KEY or the provider's API key environment variable."
            .to_string(),
        429 => {
            let wait_secs = retry_after
                .or_else(|| extract_retry_after(body))
                .unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS);
            return Error::RateLimited(wait_secs);
        }
        400 => format!("Bad request: {}", body),
        402 => "Payment required: Insufficient credits on the provider account".to_string(),
        403 => format!("Forbidden: {}", body),
        404 => format!("Model not found or endpoint unavailable: {}", body),
        500..=599 => format!("Server error: {}", body),
        _ => body.to_string(),
    };
    Error::ProviderStatus { status, message }
}

/// Extract retry-after value from error response
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    if let Some(retry_after) = json.get("retry_after").and_then(|v| v.as_u64()) {
        return Some(retry_after);
    }
    json.get("error")
        .and_then(|error| error.get("retry_after"))
        .and_then(|v| v.as_u64())
}
