//! OpenAI-compatible chat completions provider
//!
//! Speaks `POST {base_url}/chat/completions` with bearer auth. Groq is the
//! default endpoint; any compatible gateway works.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::models::ProviderConfig;
use crate::domain::ports::{ProviderCall, ProviderError, ProviderReply, ReasoningProvider};
use crate::infrastructure::logging::SecretScrubber;

/// Longest error body kept in a failure reason.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    n: u8,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP provider for OpenAI-compatible endpoints
///
/// Features:
/// - Connection pooling and reuse (via reqwest::Client)
/// - Process-wide request rate limit (governor)
/// - Status classification into transient and permanent errors
/// - Secrets scrubbed from every error message
pub struct ChatCompletionsProvider {
    name: String,
    http_client: ReqwestClient,
    base_url: String,
    request_timeout: Duration,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl ChatCompletionsProvider {
    /// Build a provider from config. `request_timeout` bounds the HTTP call
    /// itself; the dispatcher applies its own deadline as well.
    pub fn new(config: &ProviderConfig, request_timeout: Duration) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            name: config.name.clone(),
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn classify_transport(&self, error: &reqwest::Error, secret: &str) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout(self.request_timeout)
        } else {
            ProviderError::Network(
                SecretScrubber::global().scrub_with_secret(&error.to_string(), secret),
            )
        }
    }
}

/// Map a non-success HTTP status to a provider error.
pub fn error_from_status(status: StatusCode, body: &str) -> ProviderError {
    let message: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status.as_u16() {
        429 => ProviderError::RateLimited(message),
        401 | 403 => ProviderError::Auth(message),
        400 | 404 | 422 => ProviderError::InvalidRequest(message),
        code @ (408 | 409 | 500..=599) => ProviderError::Server {
            status: code,
            message,
        },
        code => ProviderError::InvalidRequest(format!("HTTP {code}: {message}")),
    }
}

#[async_trait]
impl ReasoningProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, call: ProviderCall) -> Result<ProviderReply, ProviderError> {
        self.limiter.until_ready().await;

        let secret = call.credential.expose_secret();
        let request = ChatRequest {
            model: &call.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &call.system,
                },
                ChatMessage {
                    role: "user",
                    content: &call.user,
                },
            ],
            temperature: call.temperature,
            max_tokens: call.max_tokens,
            n: 1,
        };

        debug!(
            provider = %self.name,
            model = %call.model,
            credential = %call.credential.id,
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(secret)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify_transport(&e, secret))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            let body = SecretScrubber::global().scrub_with_secret(&body, secret);
            return Err(error_from_status(status, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Invalid response body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::Malformed("No choices[0].message.content".to_string()))?;

        Ok(ProviderReply { text })
    }
}
