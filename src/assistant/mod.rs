//! Personal AI assistant
//!
//! The assistant answers with the user's social context (posts, unread
//! notifications, friends, suggestions) in its system prompt and keeps a
//! bounded memory of the conversation.

pub mod context;
pub mod memory;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::ai::{ChatMessage, ChatModel, CompletionOptions};
use crate::errors::{LinkError, Result};
use crate::store::Store;
use crate::types::UserId;

pub use context::{AssistantContext, FriendSummary, NotificationSummary, PostSummary, SuggestionSummary};
pub use memory::{AssistantMemory, LearningData, MemoryEntry, PersonalityProfile};

const GUIDANCE: &str = "Provide helpful, friendly responses that take into account the user's \
personality tags, posts, context, notifications, friends, and suggestions.
If there are unread notifications that might be relevant to the conversation, mention them.
When discussing social features, consider the user's friends and suggested connections.
Maintain context from previous messages and reference them when relevant.
When presenting tabular data, use valid GitHub-flavored markdown tables.";

pub fn system_prompt(context: &AssistantContext) -> Result<String> {
    let context_json = serde_json::to_string_pretty(context)?;
    Ok(format!(
        "You are an AI assistant with access to the user's context, history, notifications, \
friends, and suggestions.\n\nUser context:\n{}\n\n{}",
        context_json, GUIDANCE
    ))
}

/// Answer `message` for `user`
///
/// The user's message is remembered even when the model call fails.
pub async fn ask(
    store: &RwLock<Store>,
    model: &dyn ChatModel,
    user: UserId,
    message: &str,
) -> Result<String> {
    let message = message.trim();
    if message.is_empty() {
        return Err(LinkError::invalid("message cannot be empty"));
    }

    let (messages, options) = {
        let store = store.read().await;
        let context = store.assistant_context(user)?;
        let window = store.config().assistant.context_window;

        let mut messages = vec![ChatMessage::system(system_prompt(&context)?)];
        if let Some(memory) = store.assistant_memory(user) {
            messages.extend(memory.recent_context(window).into_iter().map(|entry| {
                if entry.is_user_message {
                    ChatMessage::user(entry.content.clone())
                } else {
                    ChatMessage::assistant(entry.content.clone())
                }
            }));
        }
        messages.push(ChatMessage::user(message));
        (messages, CompletionOptions::from(&store.config().ai))
    };

    store
        .write()
        .await
        .record_assistant_message(user, message, true, Utc::now())?;

    let reply = match model.complete(&messages, options).await {
        Ok(reply) => reply.trim().to_string(),
        Err(e) => {
            warn!(user = %user, error = %e, "assistant completion failed");
            return Err(e);
        }
    };

    store
        .write()
        .await
        .record_assistant_message(user, &reply, false, Utc::now())?;
    debug!(user = %user, history = messages.len() - 2, "assistant replied");
    Ok(reply)
}
