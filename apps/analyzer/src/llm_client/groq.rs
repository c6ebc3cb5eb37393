//! Groq chat-completions provider (OpenAI-compatible wire format).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ChatProvider, ChatRequest, ErrorKind, ExtractionError};

const USER_AGENT: &str = concat!("resume-analyzer/", env!("CARGO_PKG_VERSION"));

/// Ways of building the HTTP client, tried in order until one yields a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStrategy {
    /// Pooled client with the bearer credential installed as a default header.
    PooledDefaultAuth,
    /// Plain client; the credential is attached to each request.
    PerRequestAuth,
    /// Default builder with no customisation; credential per request.
    BareBuilder,
}

pub const CLIENT_STRATEGIES: [ClientStrategy; 3] = [
    ClientStrategy::PooledDefaultAuth,
    ClientStrategy::PerRequestAuth,
    ClientStrategy::BareBuilder,
];

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

pub struct GroqClient {
    http: Client,
    endpoint: Url,
    api_key: String,
    auth_per_request: bool,
    strategy: ClientStrategy,
}

impl GroqClient {
    /// Tries each strategy in order; fails with `ClientInit` when none works.
    pub fn connect(
        api_key: &str,
        base_url: &str,
        strategies: &[ClientStrategy],
    ) -> Result<Self, ExtractionError> {
        let mut failures = Vec::new();

        for &strategy in strategies {
            match Self::construct(strategy, api_key, base_url) {
                Ok(client) => {
                    info!("LLM client constructed via {strategy:?} for {}", client.endpoint);
                    return Ok(client);
                }
                Err(reason) => {
                    warn!("LLM client strategy {strategy:?} failed: {reason}");
                    failures.push(format!("{strategy:?}: {reason}"));
                }
            }
        }

        Err(ExtractionError::new(
            ErrorKind::ClientInit,
            format!(
                "no client construction strategy succeeded [{}]",
                failures.join("; ")
            ),
        ))
    }

    pub fn strategy(&self) -> ClientStrategy {
        self.strategy
    }

    fn construct(strategy: ClientStrategy, api_key: &str, base_url: &str) -> Result<Self, String> {
        let endpoint = chat_completions_url(base_url)?;

        let (builder, auth_per_request) = match strategy {
            ClientStrategy::PooledDefaultAuth => {
                let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
                    .map_err(|e| format!("credential is not a valid header value: {e}"))?;
                auth.set_sensitive(true);
                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, auth);
                (
                    Client::builder()
                        .default_headers(headers)
                        .user_agent(USER_AGENT)
                        .connect_timeout(Duration::from_secs(10))
                        .pool_idle_timeout(Duration::from_secs(90)),
                    false,
                )
            }
            ClientStrategy::PerRequestAuth => (Client::builder().user_agent(USER_AGENT), true),
            ClientStrategy::BareBuilder => (Client::builder(), true),
        };

        let http = builder.build().map_err(|e| e.to_string())?;

        Ok(Self {
            http,
            endpoint,
            api_key: api_key.to_string(),
            auth_per_request,
            strategy,
        })
    }
}

#[async_trait]
impl ChatProvider for GroqClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ExtractionError> {
        let mut builder = self.http.post(self.endpoint.clone()).json(request);
        if self.auth_per_request {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(classify_status(status.as_u16(), message).with_retry_after(retry_after));
        }

        let completion: ChatCompletion = response.json().await.map_err(|e| {
            ExtractionError::new(ErrorKind::Service, format!("undecodable completion: {e}"))
        })?;

        if let Some(usage) = &completion.usage {
            debug!(
                "LLM call to {} succeeded: prompt_tokens={}, completion_tokens={}",
                request.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ExtractionError::new(ErrorKind::Service, "provider returned no message content")
            })
    }
}

fn chat_completions_url(base_url: &str) -> Result<Url, String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let url = Url::parse(&format!("{trimmed}/chat/completions"))
        .map_err(|e| format!("invalid base URL '{base_url}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{other}' in base URL")),
    }
}

/// Maps a non-success HTTP status to an error kind.
pub fn classify_status(status: u16, message: String) -> ExtractionError {
    let kind = match status {
        401 | 403 => ErrorKind::Auth,
        429 => ErrorKind::RateLimit,
        408 => ErrorKind::Network,
        // model decommissioned or unknown to the provider
        404 => ErrorKind::Service,
        500..=599 => ErrorKind::Service,
        _ => ErrorKind::InvalidRequest,
    };
    ExtractionError::new(kind, format!("status {status}: {message}"))
}

fn classify_transport(error: reqwest::Error) -> ExtractionError {
    if error.is_builder() {
        ExtractionError::new(ErrorKind::InvalidRequest, error.to_string())
    } else {
        ExtractionError::new(ErrorKind::Network, error.to_string())
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs = raw.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}
