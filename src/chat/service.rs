//! Conversation and message operations

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::model::{
    Attachment, Conversation, ConversationKind, ConversationMember, LinkPreview, MemberRole,
    Message, MessageStatus, MessageThread, MessageType, NewMessage, Permission, Reaction,
    MAX_EMOJI_CHARS,
};
use crate::errors::{LinkError, Result};
use crate::notifications::{NewNotification, NotificationType};
use crate::realtime::{group, HubEvent};
use crate::store::Store;
use crate::types::{ConversationId, MessageId, ThreadId, UserId};

const NOTIFICATION_PREVIEW_CHARS: usize = 100;

fn preview(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        content.to_string()
    } else {
        let cut: String = content.chars().take(limit).collect();
        format!("{}...", cut)
    }
}

impl Store {
    pub fn conversation(&self, id: ConversationId) -> Result<&Conversation> {
        self.conversations
            .get(&id)
            .ok_or_else(|| LinkError::not_found("conversation", id))
    }

    fn conversation_mut(&mut self, id: ConversationId) -> Result<&mut Conversation> {
        self.conversations
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("conversation", id))
    }

    pub fn message(&self, id: MessageId) -> Result<&Message> {
        self.messages
            .get(&id)
            .ok_or_else(|| LinkError::not_found("message", id))
    }

    fn message_mut(&mut self, id: MessageId) -> Result<&mut Message> {
        self.messages
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("message", id))
    }

    fn member_role(&self, conversation: ConversationId, user: UserId) -> Result<MemberRole> {
        self.conversation(conversation)?
            .member(user)
            .map(|m| m.role)
            .ok_or_else(|| LinkError::denied("not a member of this conversation"))
    }

    fn require_permission(
        &self,
        conversation: ConversationId,
        user: UserId,
        permission: Permission,
    ) -> Result<()> {
        if self.member_role(conversation, user)?.allows(permission) {
            Ok(())
        } else {
            Err(LinkError::denied(format!(
                "role lacks permission {:?}",
                permission
            )))
        }
    }

    fn require_group(&self, conversation: ConversationId) -> Result<()> {
        if self.conversation(conversation)?.is_direct() {
            return Err(LinkError::invalid(
                "operation is only available in group conversations",
            ));
        }
        Ok(())
    }

    pub fn direct_conversation_between(&self, a: UserId, b: UserId) -> Option<&Conversation> {
        self.conversations
            .values()
            .find(|c| c.is_direct_between(a, b))
    }

    /// Returns the existing conversation for the pair if there is one
    pub fn create_direct_conversation(&mut self, a: UserId, b: UserId) -> Result<ConversationId> {
        if a == b {
            return Err(LinkError::invalid("cannot start a conversation with yourself"));
        }
        self.ensure_user(a)?;
        self.ensure_user(b)?;
        if self.is_blocked_between(a, b) {
            return Err(LinkError::Blocked);
        }

        let now = Utc::now();
        if let Some(id) = self.direct_conversation_between(a, b).map(|c| c.id) {
            let conv = self.conversation_mut(id)?;
            for user in [a, b] {
                if !conv.is_member(user) {
                    conv.members
                        .push(ConversationMember::new(user, MemberRole::Member, now));
                }
            }
            conv.is_active = true;
            return Ok(id);
        }

        let id = self.next_id();
        self.conversations.insert(
            id,
            Conversation {
                id,
                kind: ConversationKind::Direct {
                    participant1: a,
                    participant2: b,
                },
                created_at: now,
                updated_at: now,
                is_active: true,
                last_message: None,
                members: vec![
                    ConversationMember::new(a, MemberRole::Member, now),
                    ConversationMember::new(b, MemberRole::Member, now),
                ],
            },
        );
        info!(conversation_id = %id, "direct conversation created");
        Ok(id)
    }

    pub fn create_group_conversation(
        &mut self,
        creator: UserId,
        name: &str,
        initial_members: &[UserId],
    ) -> Result<ConversationId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LinkError::invalid("group conversations need a name"));
        }
        self.ensure_user(creator)?;
        for user in initial_members {
            self.ensure_user(*user)?;
        }

        let now = Utc::now();
        let mut members = vec![ConversationMember::new(creator, MemberRole::Admin, now)];
        let mut seen = BTreeSet::from([creator]);
        for user in initial_members {
            if seen.insert(*user) {
                members.push(ConversationMember::new(*user, MemberRole::Member, now));
            }
        }

        let id = self.next_id();
        self.conversations.insert(
            id,
            Conversation {
                id,
                kind: ConversationKind::Group {
                    name: name.to_string(),
                },
                created_at: now,
                updated_at: now,
                is_active: true,
                last_message: None,
                members,
            },
        );
        info!(conversation_id = %id, creator = %creator, "group conversation created");
        Ok(id)
    }

    pub fn add_member(
        &mut self,
        actor: UserId,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<()> {
        self.require_group(conversation)?;
        self.require_permission(conversation, actor, Permission::ManageMembers)?;
        self.ensure_user(user)?;

        let conv = self.conversation_mut(conversation)?;
        if conv.is_member(user) {
            return Err(LinkError::conflict("user is already a member"));
        }
        conv.members
            .push(ConversationMember::new(user, MemberRole::Member, Utc::now()));
        Ok(())
    }

    /// Removing yourself leaves the group
    pub fn remove_member(
        &mut self,
        actor: UserId,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<()> {
        self.require_group(conversation)?;
        if actor == user {
            self.member_role(conversation, actor)?;
        } else {
            self.require_permission(conversation, actor, Permission::ManageMembers)?;
        }

        let conv = self.conversation_mut(conversation)?;
        let before = conv.members.len();
        conv.members.retain(|m| m.user != user);
        if conv.members.len() == before {
            return Err(LinkError::not_found("member", user));
        }
        Ok(())
    }

    pub fn set_member_role(
        &mut self,
        actor: UserId,
        conversation: ConversationId,
        user: UserId,
        role: MemberRole,
    ) -> Result<()> {
        self.require_group(conversation)?;
        self.require_permission(conversation, actor, Permission::ManageMembers)?;
        let member = self
            .conversation_mut(conversation)?
            .member_mut(user)
            .ok_or_else(|| LinkError::not_found("member", user))?;
        member.role = role;
        Ok(())
    }

    fn validated_content(&self, content: &str, has_attachments: bool) -> Result<String> {
        let content = content.trim();
        if content.is_empty() && !has_attachments {
            return Err(LinkError::invalid(
                "message must have content or attachments",
            ));
        }
        let limit = self.config.chat.max_message_chars;
        if content.chars().count() > limit {
            return Err(LinkError::invalid(format!(
                "message exceeds {} characters",
                limit
            )));
        }
        Ok(content.to_string())
    }

    pub fn send_message(&mut self, new: NewMessage) -> Result<MessageId> {
        self.insert_message(new, None)
    }

    fn insert_message(&mut self, new: NewMessage, thread: Option<ThreadId>) -> Result<MessageId> {
        let conv = self.conversation(new.conversation)?;
        if !conv.is_active {
            return Err(LinkError::InvalidState {
                entity: "conversation",
                from: "inactive".to_string(),
                action: "send to",
            });
        }
        self.require_permission(new.conversation, new.sender, Permission::SendMessages)?;
        let content = self.validated_content(&new.content, !new.attachments.is_empty())?;

        if let Some(parent) = new.reply_to {
            if self.message(parent)?.conversation != new.conversation {
                return Err(LinkError::invalid(
                    "replied-to message belongs to another conversation",
                ));
            }
        }
        if let Some(story) = new.story {
            self.story(story)?;
        }

        let id: MessageId = self.next_id();
        let now = Utc::now();
        let message_type = MessageType::derive(&content, &new.attachments);
        let message = Message {
            id,
            conversation: new.conversation,
            sender: new.sender,
            content: content.clone(),
            attachments: new.attachments,
            story: new.story,
            message_type,
            status: MessageStatus::Sent,
            created_at: now,
            updated_at: now,
            is_edited: false,
            reply_to: new.reply_to,
            thread,
            is_pinned: false,
            is_forwarded: false,
            original_message: None,
            is_thread_reply: thread.is_some(),
            reactions: Vec::new(),
            link_previews: Vec::new(),
        };
        self.messages.insert(id, message);

        let conv = self.conversation_mut(new.conversation)?;
        conv.last_message = Some(id);
        conv.updated_at = now;
        let mut recipients = Vec::new();
        for member in conv.members.iter_mut().filter(|m| m.user != new.sender) {
            member.unread_count += 1;
            if !member.is_muted {
                recipients.push(member.user);
            }
        }
        let direct_pair = match conv.kind {
            ConversationKind::Direct {
                participant1,
                participant2,
            } => Some((participant1, participant2)),
            ConversationKind::Group { .. } => None,
        };

        if let Some((a, b)) = direct_pair {
            self.record_interaction(a, b, now);
        }

        self.dispatch(
            group::chat(new.conversation),
            HubEvent::ChatMessage {
                conversation_id: new.conversation,
                message_id: id,
                sender_id: new.sender,
                content: content.clone(),
                message_type: message_type.as_str().to_string(),
            },
        );

        let sender_name = self.user(new.sender)?.full_name();
        for recipient in recipients {
            self.notify(
                NewNotification::new(
                    recipient,
                    NotificationType::Message,
                    format!("New message from {}", sender_name),
                    preview(&content, NOTIFICATION_PREVIEW_CHARS),
                )
                .sender(new.sender)
                .data(json!({
                    "conversation_id": new.conversation,
                    "message_id": id,
                })),
            )?;
        }

        debug!(message_id = %id, conversation_id = %new.conversation, "message sent");
        Ok(id)
    }

    pub fn edit_message(&mut self, actor: UserId, id: MessageId, content: &str) -> Result<()> {
        let message = self.message(id)?;
        if message.sender != actor {
            return Err(LinkError::denied("only the sender can edit a message"));
        }
        let content = self.validated_content(content, !message.attachments.is_empty())?;

        let message = self.message_mut(id)?;
        message.content = content.clone();
        message.is_edited = true;
        message.updated_at = Utc::now();
        let conversation = message.conversation;

        self.dispatch(
            group::chat(conversation),
            HubEvent::MessageEdited {
                conversation_id: conversation,
                message_id: id,
                content,
            },
        );
        Ok(())
    }

    pub fn delete_message(&mut self, actor: UserId, id: MessageId) -> Result<()> {
        let message = self.message(id)?;
        let conversation = message.conversation;
        if message.sender != actor {
            self.require_permission(conversation, actor, Permission::DeleteMessages)?;
        }

        self.messages.remove(&id);
        let previous = self
            .messages
            .values()
            .filter(|m| m.conversation == conversation)
            .map(|m| m.id)
            .max();

        let conv = self.conversation_mut(conversation)?;
        if conv.last_message == Some(id) {
            conv.last_message = previous;
        }

        self.dispatch(
            group::chat(conversation),
            HubEvent::MessageDeleted {
                conversation_id: conversation,
                message_id: id,
            },
        );
        info!(message_id = %id, actor = %actor, "message deleted");
        Ok(())
    }

    /// Returns whether the reaction is present afterwards
    pub fn toggle_reaction(&mut self, actor: UserId, id: MessageId, emoji: &str) -> Result<bool> {
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.chars().count() > MAX_EMOJI_CHARS {
            return Err(LinkError::invalid("emoji must be 1 to 10 characters"));
        }
        let conversation = self.message(id)?.conversation;
        self.require_permission(conversation, actor, Permission::ReactMessages)?;

        let message = self.message_mut(id)?;
        let existing = message
            .reactions
            .iter()
            .position(|r| r.user == actor && r.emoji == emoji);
        let added = match existing {
            Some(index) => {
                message.reactions.remove(index);
                false
            }
            None => {
                message.reactions.push(Reaction {
                    user: actor,
                    emoji: emoji.to_string(),
                    created_at: Utc::now(),
                });
                true
            }
        };

        self.dispatch(
            group::chat(conversation),
            HubEvent::ReactionUpdate {
                message_id: id,
                user_id: actor,
                emoji: emoji.to_string(),
                added,
            },
        );
        Ok(added)
    }

    /// Clears the actor's unread count; returns how many messages became read
    pub fn mark_conversation_read(
        &mut self,
        actor: UserId,
        conversation: ConversationId,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let member = self
            .conversation_mut(conversation)?
            .member_mut(actor)
            .ok_or_else(|| LinkError::denied("not a member of this conversation"))?;
        member.unread_count = 0;
        member.last_read = Some(now);

        let mut changed = 0;
        for message in self.messages.values_mut().filter(|m| {
            m.conversation == conversation
                && m.sender != actor
                && m.status.can_advance_to(MessageStatus::Read)
        }) {
            message.status = MessageStatus::Read;
            changed += 1;
        }

        self.dispatch(
            group::chat(conversation),
            HubEvent::ReadReceipt {
                conversation_id: conversation,
                user_id: actor,
            },
        );
        Ok(changed)
    }

    pub fn update_message_status(&mut self, id: MessageId, status: MessageStatus) -> Result<()> {
        let message = self.message_mut(id)?;
        if message.status == status {
            return Ok(());
        }
        if !message.status.can_advance_to(status) {
            return Err(LinkError::InvalidState {
                entity: "message",
                from: message.status.as_str().to_string(),
                action: "change status of",
            });
        }
        message.status = status;
        Ok(())
    }

    pub fn pin_message(&mut self, actor: UserId, id: MessageId, pinned: bool) -> Result<()> {
        let conversation = self.message(id)?.conversation;
        if self.conversation(conversation)?.is_direct() {
            self.member_role(conversation, actor)?;
        } else {
            self.require_permission(conversation, actor, Permission::PinMessages)?;
        }
        self.message_mut(id)?.is_pinned = pinned;
        Ok(())
    }

    pub fn pinned_messages(&self, conversation: ConversationId) -> Vec<&Message> {
        self.messages
            .values()
            .filter(|m| m.conversation == conversation && m.is_pinned)
            .collect()
    }

    pub fn forward_message(
        &mut self,
        actor: UserId,
        id: MessageId,
        target: ConversationId,
    ) -> Result<MessageId> {
        let source = self.message(id)?.clone();
        self.member_role(source.conversation, actor)?;

        let new = NewMessage {
            conversation: target,
            sender: actor,
            content: source.content,
            attachments: source.attachments,
            reply_to: None,
            story: source.story,
        };
        let forwarded = self.send_message(new)?;
        let message = self.message_mut(forwarded)?;
        message.is_forwarded = true;
        message.original_message = Some(source.original_message.unwrap_or(id));
        Ok(forwarded)
    }

    /// Reply inside the thread hanging off `parent`, opening it on first use
    pub fn reply_in_thread(
        &mut self,
        actor: UserId,
        parent: MessageId,
        content: &str,
    ) -> Result<MessageId> {
        let conversation = self.message(parent)?.conversation;
        self.require_group(conversation)?;
        self.member_role(conversation, actor)?;

        let now = Utc::now();
        let existing = self
            .threads
            .values()
            .find(|t| t.parent_message == parent)
            .map(|t| t.id);
        let thread_id = match existing {
            Some(id) => id,
            None => {
                let id = self.next_id();
                self.threads.insert(
                    id,
                    MessageThread {
                        id,
                        conversation,
                        parent_message: parent,
                        participants: BTreeSet::new(),
                        created_by: actor,
                        created_at: now,
                        last_reply_at: now,
                    },
                );
                self.message_mut(parent)?.thread = Some(id);
                id
            }
        };

        let reply = self.insert_message(
            NewMessage::text(conversation, actor, content),
            Some(thread_id),
        )?;
        if let Some(thread) = self.threads.get_mut(&thread_id) {
            thread.participants.insert(actor);
            thread.last_reply_at = now;
        }
        Ok(reply)
    }

    pub fn thread(&self, id: ThreadId) -> Result<&MessageThread> {
        self.threads
            .get(&id)
            .ok_or_else(|| LinkError::not_found("thread", id))
    }

    pub fn thread_replies(&self, id: ThreadId) -> Vec<&Message> {
        self.messages
            .values()
            .filter(|m| m.thread == Some(id) && m.is_thread_reply)
            .collect()
    }

    pub fn set_muted(
        &mut self,
        actor: UserId,
        conversation: ConversationId,
        muted: bool,
    ) -> Result<()> {
        let member = self
            .conversation_mut(conversation)?
            .member_mut(actor)
            .ok_or_else(|| LinkError::denied("not a member of this conversation"))?;
        member.is_muted = muted;
        Ok(())
    }

    pub fn set_pinned(
        &mut self,
        actor: UserId,
        conversation: ConversationId,
        pinned: bool,
    ) -> Result<()> {
        let member = self
            .conversation_mut(conversation)?
            .member_mut(actor)
            .ok_or_else(|| LinkError::denied("not a member of this conversation"))?;
        member.is_pinned = pinned;
        Ok(())
    }

    pub fn set_typing(
        &mut self,
        actor: UserId,
        conversation: ConversationId,
        is_typing: bool,
    ) -> Result<()> {
        self.member_role(conversation, actor)?;
        self.dispatch(
            group::chat(conversation),
            HubEvent::Typing {
                conversation_id: conversation,
                user_id: actor,
                is_typing,
            },
        );
        Ok(())
    }

    /// Pinned conversations first, then most recently updated
    pub fn conversations_for(&self, user: UserId) -> Vec<&Conversation> {
        let mut list: Vec<(&Conversation, bool)> = self
            .conversations
            .values()
            .filter(|c| c.is_active)
            .filter_map(|c| c.member(user).map(|m| (c, m.is_pinned)))
            .collect();
        list.sort_by(|(a, a_pinned), (b, b_pinned)| {
            b_pinned
                .cmp(a_pinned)
                .then(b.updated_at.cmp(&a.updated_at))
                .then(b.id.cmp(&a.id))
        });
        list.into_iter().map(|(c, _)| c).collect()
    }

    /// Up to `limit` messages older than `before`, oldest first
    pub fn messages(
        &self,
        conversation: ConversationId,
        viewer: UserId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<&Message>> {
        self.member_role(conversation, viewer)?;
        let mut list: Vec<&Message> = self
            .messages
            .values()
            .filter(|m| m.conversation == conversation)
            .filter(|m| before.map_or(true, |b| m.id < b))
            .collect();
        let skip = list.len().saturating_sub(limit);
        list.drain(..skip);
        Ok(list)
    }

    /// Latest `limit` messages, oldest first, without a membership check
    pub(crate) fn recent_messages(&self, conversation: ConversationId, limit: usize) -> Vec<&Message> {
        let list: Vec<&Message> = self
            .messages
            .values()
            .filter(|m| m.conversation == conversation)
            .collect();
        let skip = list.len().saturating_sub(limit);
        list.into_iter().skip(skip).collect()
    }

    pub fn add_link_preview(
        &mut self,
        actor: UserId,
        id: MessageId,
        preview: LinkPreview,
    ) -> Result<()> {
        preview.validate()?;
        let message = self.message_mut(id)?;
        if message.sender != actor {
            return Err(LinkError::denied("only the sender can add link previews"));
        }
        message.link_previews.push(preview);
        Ok(())
    }

    pub fn attachments_in(&self, conversation: ConversationId) -> Vec<&Attachment> {
        self.messages
            .values()
            .filter(|m| m.conversation == conversation)
            .flat_map(|m| m.attachments.iter())
            .collect()
    }
}
