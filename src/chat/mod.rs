//! Direct and group conversations
//!
//! Membership roles gate what a participant may do; sending a message
//! updates unread counters, queues a realtime event for the conversation
//! group and notifies unmuted members.

pub mod model;
pub mod service;

pub use model::{
    Attachment, Conversation, ConversationKind, ConversationMember, FileCategory, LinkPreview,
    MemberRole, Message, MessageStatus, MessageThread, MessageType, NewMessage, Permission,
    Reaction, MAX_EMOJI_CHARS,
};
