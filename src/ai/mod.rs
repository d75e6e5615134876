//! Chat-completion layer
//!
//! Every AI feature talks to a [`ChatModel`]. The production implementation
//! is [`OpenAiCompatClient`]; tests substitute a scripted model.

pub mod client;
pub mod parser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::errors::Result;

pub use client::OpenAiCompatClient;
pub use parser::{all_scores, extract_json_object, first_score, SseLineBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::from(&AiConfig::default())
    }
}

impl From<&AiConfig> for CompletionOptions {
    fn from(config: &AiConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }
}

/// A chat-completion backend
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion and return the assistant text
    async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions)
        -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Single-turn convenience wrapper
pub async fn ask_once(
    model: &dyn ChatModel,
    prompt: &str,
    options: CompletionOptions,
) -> Result<String> {
    let reply = model.complete(&[ChatMessage::user(prompt)], options).await?;
    Ok(reply.trim().to_string())
}
