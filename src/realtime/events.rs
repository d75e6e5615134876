//! Event payloads pushed to realtime subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommentId, ConversationId, MessageId, PostId, ReplyId, UserId};

/// Group naming conventions shared by producers and subscribers
pub mod group {
    use crate::types::{ConversationId, UserId};

    pub const PRESENCE: &str = "presence";

    pub fn notifications(user: UserId) -> String {
        format!("notifications_{}", user)
    }

    pub fn chat(conversation: ConversationId) -> String {
        format!("chat_{}", conversation)
    }

    pub fn community(slug: &str) -> String {
        format!("community_{}", slug)
    }
}

/// Realtime events, serialized with a `type` tag for clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    NotificationMessage {
        data: serde_json::Value,
    },
    ChatMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
        sender_id: UserId,
        content: String,
        message_type: String,
    },
    MessageEdited {
        conversation_id: ConversationId,
        message_id: MessageId,
        content: String,
    },
    MessageDeleted {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    ReactionUpdate {
        message_id: MessageId,
        user_id: UserId,
        emoji: String,
        added: bool,
    },
    ReadReceipt {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    Typing {
        conversation_id: ConversationId,
        user_id: UserId,
        is_typing: bool,
    },
    RatingUpdate {
        post_id: PostId,
        comment_id: Option<CommentId>,
        reply_id: Option<ReplyId>,
        rating: f64,
        total_ratings: u32,
    },
    CommentUpdate {
        action: String,
        post_id: PostId,
        comment_id: Option<CommentId>,
        content: Option<String>,
    },
    ReplyDeleted {
        post_id: PostId,
        comment_id: CommentId,
        reply_id: ReplyId,
    },
    PresenceUpdate {
        user_id: UserId,
        status: String,
    },
    MemberJoined {
        user_id: UserId,
        scope: String,
    },
}

/// An event addressed to a group, queued by a store operation
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub group: String,
    pub event: HubEvent,
}

/// What subscribers receive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub group: String,
    pub event: HubEvent,
    pub sent_at: DateTime<Utc>,
}
