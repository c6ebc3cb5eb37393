/// LLM client: the single point of entry for provider calls in the analyzer.
///
/// No other module may talk to the provider directly. Callers hand over a
/// `PromptSpec` and receive either the raw reply text (plus which model produced it)
/// or a classified `ExtractionError`.
///
/// Model order: a higher-capability model first, a cheaper/faster fallback second.
/// Only capacity/availability failures move a call on to the fallback.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;

pub mod groq;
pub mod prompts;
#[cfg(test)]
pub mod testing;

pub const PREFERRED_MODEL: &str = "llama-3.3-70b-versatile";
pub const FALLBACK_MODEL: &str = "llama-3.1-8b-instant";
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// No construction strategy produced a usable client.
    ClientInit,
    /// Invalid or expired credential.
    Auth,
    RateLimit,
    Network,
    /// Provider-side failure, including an unavailable model.
    Service,
    /// The provider rejected the request itself (too large, malformed).
    InvalidRequest,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::Network | ErrorKind::Service
        )
    }

    /// Capacity/availability failures are the ones a different model may not share.
    pub fn is_capacity(&self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::Service)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ClientInit => "ClientInitError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::RateLimit => "RateLimitError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Service => "ServiceError",
            ErrorKind::InvalidRequest => "InvalidRequest",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ExtractionError {
    pub kind: ErrorKind,
    pub message: String,
    /// Server-provided wait hint (e.g. `Retry-After` on 429).
    pub retry_after: Option<Duration>,
}

impl ExtractionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// System instruction + user message, plus sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSpec {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl PromptSpec {
    pub fn to_request(&self, model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: self.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.user.clone(),
                },
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        }
    }
}

/// OpenAI-compatible chat-completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// The unmodified reply text and the model that produced it.
#[derive(Debug, Clone)]
pub struct RawReply {
    pub content: String,
    pub model: String,
    pub used_fallback: bool,
}

/// One chat-completion round trip. Implementations classify every failure.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ExtractionError>;
}

/// Shared, stateless extraction adapter: model fallback + bounded retry around a provider.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn ChatProvider>,
    models: Vec<String>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            models: vec![PREFERRED_MODEL.to_string(), FALLBACK_MODEL.to_string()],
            policy: RetryPolicy::extraction(),
            attempt_timeout: ATTEMPT_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    #[cfg(test)]
    pub fn with_retry(mut self, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        self.policy = policy;
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Runs the prompt against the preferred model, falling back to the next model
    /// only when the preferred one fails for capacity/availability reasons.
    pub async fn extract(&self, prompt: &PromptSpec) -> Result<RawReply, ExtractionError> {
        let mut last_error: Option<ExtractionError> = None;

        for (index, model) in self.models.iter().enumerate() {
            if let Some(previous) = &last_error {
                warn!("Falling back to model {model} after: {previous}");
            }

            match self.call_with_retry(model, prompt).await {
                Ok(content) => {
                    if index > 0 {
                        info!("Extraction succeeded on fallback model {model}");
                    }
                    return Ok(RawReply {
                        content,
                        model: model.clone(),
                        used_fallback: index > 0,
                    });
                }
                Err(e) if e.kind.is_capacity() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| ExtractionError::new(ErrorKind::ClientInit, "no models configured")))
    }

    /// Calls one model, retrying retryable kinds with exponential backoff and jitter.
    /// Each attempt is bounded by `attempt_timeout`.
    async fn call_with_retry(
        &self,
        model: &str,
        prompt: &PromptSpec,
    ) -> Result<String, ExtractionError> {
        let request = prompt.to_request(model);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result =
                match tokio::time::timeout(self.attempt_timeout, self.provider.complete(&request))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ExtractionError::new(
                        ErrorKind::Network,
                        format!(
                            "no response from {model} within {}ms",
                            self.attempt_timeout.as_millis()
                        ),
                    )),
                };

            match result {
                Ok(content) => {
                    debug!("LLM call to {model} succeeded on attempt {attempt}");
                    return Ok(content);
                }
                Err(e) if e.kind.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.delay_for(attempt, e.retry_after);
                    warn!(
                        "LLM call to {model} attempt {attempt}/{max_attempts} failed ({e}), retrying after {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
