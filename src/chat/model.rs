use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::{LinkError, Result};
use crate::types::{ConversationId, MessageId, StoryId, ThreadId, UserId};

pub const MAX_EMOJI_CHARS: usize = 10;
const MAX_PREVIEW_TITLE: usize = 255;
const MAX_PREVIEW_DESCRIPTION: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationKind {
    Direct {
        participant1: UserId,
        participant2: UserId,
    },
    Group {
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Moderator,
    Member,
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(MemberRole::Admin),
            "moderator" => Ok(MemberRole::Moderator),
            "member" => Ok(MemberRole::Member),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    SendMessages,
    ReactMessages,
    DeleteMessages,
    PinMessages,
    MuteMembers,
    ManageMembers,
}

impl MemberRole {
    /// Moderators keep every member ability on top of their own
    pub fn allows(&self, permission: Permission) -> bool {
        match self {
            MemberRole::Admin => true,
            MemberRole::Moderator => !matches!(permission, Permission::ManageMembers),
            MemberRole::Member => matches!(
                permission,
                Permission::SendMessages | Permission::ReactMessages
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMember {
    pub user: UserId,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub last_read: Option<DateTime<Utc>>,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub unread_count: u32,
}

impl ConversationMember {
    pub(crate) fn new(user: UserId, role: MemberRole, now: DateTime<Utc>) -> Self {
        Self {
            user,
            role,
            joined_at: now,
            last_read: None,
            is_muted: false,
            is_pinned: false,
            unread_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    pub last_message: Option<MessageId>,
    pub members: Vec<ConversationMember>,
}

impl Conversation {
    pub fn is_direct(&self) -> bool {
        matches!(self.kind, ConversationKind::Direct { .. })
    }

    pub fn member(&self, user: UserId) -> Option<&ConversationMember> {
        self.members.iter().find(|m| m.user == user)
    }

    pub(crate) fn member_mut(&mut self, user: UserId) -> Option<&mut ConversationMember> {
        self.members.iter_mut().find(|m| m.user == user)
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.member(user).is_some()
    }

    pub fn is_direct_between(&self, a: UserId, b: UserId) -> bool {
        match self.kind {
            ConversationKind::Direct {
                participant1,
                participant2,
            } => (participant1 == a && participant2 == b) || (participant1 == b && participant2 == a),
            ConversationKind::Group { .. } => false,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.kind {
            ConversationKind::Direct {
                participant1,
                participant2,
            } => format!("direct {} & {}", participant1, participant2),
            ConversationKind::Group { name } => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "tiff", "ico", "heic", "heif",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "wmv", "flv", "mkv", "webm", "m4v", "3gp", "mpeg", "mpg",
];
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "ogg", "m4a", "flac", "aac", "wma", "aiff", "mid", "midi",
];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "txt", "rtf", "doc", "docx", "odt", "pages", "xls", "xlsx", "csv", "ods", "numbers", "ppt",
    "pptx", "key", "odp", "pdf", "zip", "rar", "7z", "tar", "gz", "bz2", "py", "js", "html",
    "css", "php", "java", "cpp", "c", "h", "ts", "jsx", "tsx", "md", "markdown", "xml", "json",
    "yaml", "yml", "epub", "mobi", "azw3", "djvu",
];

impl FileCategory {
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.to_ascii_lowercase();
        let ext = ext.as_str();
        if IMAGE_EXTENSIONS.contains(&ext) {
            FileCategory::Image
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            FileCategory::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            FileCategory::Audio
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            FileCategory::Document
        } else {
            FileCategory::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    /// Lower-case extension
    pub file_type: String,
    pub size: u64,
    pub category: FileCategory,
    /// Seconds, for audio and video
    pub duration: Option<u32>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, size: u64) -> Self {
        let file_name = file_name.into();
        let file_type = file_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let category = FileCategory::from_extension(&file_type);
        Self {
            file_name,
            file_type,
            size,
            category,
            duration: None,
        }
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    File,
    Voice,
    Video,
    Mixed,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::Voice => "voice",
            MessageType::Video => "video",
            MessageType::Mixed => "mixed",
        }
    }

    /// Type implied by a message's content and attachments
    pub fn derive(content: &str, attachments: &[Attachment]) -> Self {
        match attachments.first() {
            None => MessageType::Text,
            Some(_) if !content.is_empty() => MessageType::Mixed,
            Some(first) => match first.category {
                FileCategory::Image => MessageType::Image,
                FileCategory::Video => MessageType::Video,
                FileCategory::Audio => MessageType::Voice,
                FileCategory::Document | FileCategory::Other => MessageType::File,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        }
    }

    /// Statuses only move forward; failure is only possible before delivery
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Sent, MessageStatus::Delivered)
                | (MessageStatus::Sent, MessageStatus::Read)
                | (MessageStatus::Sent, MessageStatus::Failed)
                | (MessageStatus::Delivered, MessageStatus::Read)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub user: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
}

impl LinkPreview {
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(LinkError::invalid("link preview URL must be http or https"));
        }
        if self.title.chars().count() > MAX_PREVIEW_TITLE {
            return Err(LinkError::invalid("link preview title too long"));
        }
        if self.description.chars().count() > MAX_PREVIEW_DESCRIPTION {
            return Err(LinkError::invalid("link preview description too long"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation: ConversationId,
    pub sender: UserId,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub story: Option<StoryId>,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_edited: bool,
    pub reply_to: Option<MessageId>,
    pub thread: Option<ThreadId>,
    pub is_pinned: bool,
    pub is_forwarded: bool,
    pub original_message: Option<MessageId>,
    pub is_thread_reply: bool,
    pub reactions: Vec<Reaction>,
    pub link_previews: Vec<LinkPreview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageThread {
    pub id: ThreadId,
    pub conversation: ConversationId,
    pub parent_message: MessageId,
    pub participants: BTreeSet<UserId>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub last_reply_at: DateTime<Utc>,
}

/// Input for sending a message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation: ConversationId,
    pub sender: UserId,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<MessageId>,
    pub story: Option<StoryId>,
}

impl NewMessage {
    pub fn text(conversation: ConversationId, sender: UserId, content: impl Into<String>) -> Self {
        Self {
            conversation,
            sender,
            content: content.into(),
            attachments: Vec::new(),
            reply_to: None,
            story: None,
        }
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn reply_to(mut self, message: MessageId) -> Self {
        self.reply_to = Some(message);
        self
    }

    pub fn story(mut self, story: StoryId) -> Self {
        self.story = Some(story);
        self
    }
}
