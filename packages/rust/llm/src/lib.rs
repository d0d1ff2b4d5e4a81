//! Generative model client for drafting and compliance review.
//!
//! Everything downstream talks to the model through the [`GenerativeProvider`]
//! trait, so the pipeline can run against a mock in tests. The production
//! implementation is [`HttpGenerativeClient`], a thin chat-completions client
//! with a fixed retry schedule for rate-limit responses.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use briefdesk_shared::{BriefdeskError, Result};

/// Fixed backoff schedule for rate-limited calls: retry after 15s, then 30s.
/// Only rate-limit-class errors are retried; everything else fails fast.
const RETRY_DELAYS_SECS: &[u64] = &[15, 30];

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One generation request: an optional system prompt, the user prompt, and
/// sampling temperature.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
}

/// Seam between the pipeline and the generative model.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Generate a completion for the request. Implementations handle their
    /// own retry policy; a returned error is final.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Model identifier recorded on generated sections.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Chat-completions wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Production chat-completions client.
pub struct HttpGenerativeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry_delays: Vec<Duration>,
}

impl HttpGenerativeClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            retry_delays: RETRY_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }

    /// Override the retry schedule. Tests use short delays.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    async fn call_once(&self, request: &GenerationRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
        };

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BriefdeskError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BriefdeskError::Llm(format!(
                "model call failed with status {status}: {text}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BriefdeskError::Llm(format!("malformed model response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BriefdeskError::Llm("model response contained no choices".into()))
    }
}

#[async_trait]
impl GenerativeProvider for HttpGenerativeClient {
    /// Call the model, retrying only rate-limit-class failures on the fixed
    /// backoff schedule. Three attempts total, then the last error surfaces.
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.call_once(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_rate_limit() && attempt < self.retry_delays.len() => {
                    let delay = self.retry_delays[attempt];
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        delay_secs = delay.as_secs(),
                        "rate limited by model provider, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Output hygiene
// ---------------------------------------------------------------------------

/// Strip a surrounding markdown code fence from model output, if present.
///
/// Models wrap JSON in ```json ... ``` fences despite instructions not to.
/// Leaves the text untouched when no fence wraps the whole payload.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop a language tag on the opening fence line ("json", "html", ...)
    match inner.split_once('\n') {
        Some((first_line, body)) if !first_line.trim().is_empty() && !first_line.contains(' ') => {
            body.trim()
        }
        _ => inner.trim(),
    }
}
