//! Completion client abstraction and the OpenAI-style HTTP implementation.
//!
//! The generative model is opaque: prompt in, text out. Errors distinguish
//! the retryable class (timeout, rate limit, transient network, 5xx) from
//! the non-retryable one (bad credentials, malformed request); retries are
//! off by default and bounded when enabled, and the last underlying cause
//! is what surfaces.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::pipeline::{take_text, Component, SocketSpec, SocketValues, Value, ValueKind};

/// A remote text-completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// OpenAI-style `POST {base_url}/chat/completions` client.
pub struct HttpCompletionClient {
    model: String,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| GenerationError::MissingCredentials(config.api_key_env.clone()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout_secs)
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => GenerationError::Auth {
                    status: status.as_u16(),
                    message,
                },
                429 => GenerationError::RateLimited(message),
                _ => GenerationError::Service {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(GenerationError::EmptyResponse)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!("generation retry {} after {:?}", attempt, delay);
                tokio::time::sleep(delay).await;
            }

            match self.complete_once(prompt).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_retryable() => last_err = Some(err),
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or(GenerationError::EmptyResponse))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

/// Pipeline component wrapping a [`CompletionClient`].
pub struct Generator {
    client: Arc<dyn CompletionClient>,
}

impl Generator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }
}

const PROMPT_IN: &[SocketSpec] = &[SocketSpec::required("prompt", ValueKind::Text)];
const REPLY_OUT: &[SocketSpec] = &[SocketSpec::required("reply", ValueKind::Text)];

#[async_trait]
impl Component for Generator {
    fn input_sockets(&self) -> &[SocketSpec] {
        PROMPT_IN
    }

    fn output_sockets(&self) -> &[SocketSpec] {
        REPLY_OUT
    }

    async fn run(&self, mut inputs: SocketValues) -> crate::error::Result<SocketValues> {
        let prompt = take_text(&mut inputs, "prompt")?;
        debug!(model = %self.client.model(), "requesting completion");
        let reply = self.client.complete(&prompt).await?;

        let mut out = SocketValues::new();
        out.insert("reply".into(), Value::Text(reply));
        Ok(out)
    }
}
