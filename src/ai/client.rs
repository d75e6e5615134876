//! OpenAI-compatible chat-completion client
//!
//! Talks to any provider exposing `POST {base}/chat/completions`
//! (OpenRouter, Mistral, a local gateway):
//! - Bearer auth with a key taken from the environment
//! - HTTP 402 surfaces as `InsufficientCredits` so callers can abort batches
//! - Streaming over server-sent events

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::parser::{sse_data, SseLineBuffer};
use super::{ChatMessage, ChatModel, CompletionOptions};
use crate::config::AiConfig;
use crate::errors::{LinkError, Result};

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiCompatClient {
    /// Build a client; the API key is read from `config.api_key_env`
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LinkError::AiUnavailable(format!(
                    "environment variable {} is not set",
                    config.api_key_env
                ))
            })?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &AiConfig, api_key: impl Into<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        options: CompletionOptions,
        stream: bool,
    ) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stream,
        }
    }

    async fn send(&self, body: &CompletionRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LinkError::Timeout {
                        duration_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    LinkError::Http(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::PAYMENT_REQUIRED {
            warn!(model = %self.model, "provider reports insufficient credits");
            return Err(LinkError::InsufficientCredits);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LinkError::AiApi {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Stream content deltas as they arrive
    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let body = self.request_body(messages, options, true);
        let response = self.send(&body).await?;

        let bytes = Box::pin(response.bytes_stream());
        let stream = futures_util::stream::unfold(
            (bytes, SseLineBuffer::new(), Vec::<String>::new(), false),
            |(mut bytes, mut lines, mut pending, mut done)| async move {
                loop {
                    if let Some(delta) = pending.pop() {
                        return Some((Ok(delta), (bytes, lines, pending, done)));
                    }
                    if done {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            let mut deltas = Vec::new();
                            for line in lines.push(&chunk) {
                                match parse_sse_line(&line) {
                                    SseLine::Delta(text) => deltas.push(text),
                                    SseLine::Done => {
                                        done = true;
                                        break;
                                    }
                                    SseLine::Skip => {}
                                }
                            }
                            // popped from the back
                            deltas.reverse();
                            pending = deltas;
                        }
                        Some(Err(e)) => {
                            done = true;
                            return Some((
                                Err(LinkError::Streaming(e.to_string())),
                                (bytes, lines, pending, done),
                            ));
                        }
                        None => {
                            done = true;
                            // a final event may arrive without its newline
                            if let Some(SseLine::Delta(text)) =
                                lines.finish().as_deref().map(parse_sse_line)
                            {
                                pending.push(text);
                            }
                        }
                    }
                }
            },
        );
        Ok(stream.boxed())
    }

    /// Whether the provider answers `GET /models`
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        match self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String> {
        let body = self.request_body(messages, options, false);
        let response = self.send(&body).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LinkError::ParseError(format!("invalid completion body: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LinkError::ParseError("completion has no choices".to_string()))?;

        debug!(model = %self.model, chars = content.len(), "completion received");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = sse_data(line) else {
        return SseLine::Skip;
    };
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map(SseLine::Delta)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            debug!(error = %e, "skipping unparsable stream chunk");
            SseLine::Skip
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
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
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}
