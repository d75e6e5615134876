//! In-memory domain store
//!
//! Every table of the social graph lives here, keyed by typed ids drawn from
//! a single sequence. Domain services are `impl Store` blocks in their own
//! modules; they validate, mutate and queue realtime dispatches on the
//! outbox. The outbox and the active configuration are never serialized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::assistant::AssistantMemory;
use crate::chat::{Conversation, Message, MessageThread};
use crate::community::{
    Comment, Community, CommunityEvent, JoinRequest, Post, Reply, SavedPost,
};
use crate::config::Config;
use crate::connections::{Connection, ConnectionRequest};
use crate::errors::{LinkError, Result};
use crate::notifications::{Notification, NotificationPreferences};
use crate::realtime::{Dispatch, HubEvent};
use crate::stories::Story;
use crate::suggestions::UserSuggestion;
use crate::types::{
    CommentId, CommunityId, ConnectionId, ConversationId, EventId, JoinRequestId, MessageId,
    NotificationId, PostId, ReplyId, RequestId, StoryId, ThreadId, UserId,
};
use crate::users::{Block, Endorsement, Follow, User};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Store {
    next_id: u64,

    pub(crate) users: BTreeMap<UserId, User>,
    pub(crate) endorsements: Vec<Endorsement>,
    pub(crate) follows: Vec<Follow>,
    pub(crate) blocks: Vec<Block>,

    pub(crate) connections: BTreeMap<ConnectionId, Connection>,
    pub(crate) requests: BTreeMap<RequestId, ConnectionRequest>,
    pub(crate) suggestions: Vec<UserSuggestion>,

    pub(crate) conversations: BTreeMap<ConversationId, Conversation>,
    pub(crate) messages: BTreeMap<MessageId, Message>,
    pub(crate) threads: BTreeMap<ThreadId, MessageThread>,

    pub(crate) communities: BTreeMap<CommunityId, Community>,
    pub(crate) join_requests: BTreeMap<JoinRequestId, JoinRequest>,
    pub(crate) posts: BTreeMap<PostId, Post>,
    pub(crate) comments: BTreeMap<CommentId, Comment>,
    pub(crate) replies: BTreeMap<ReplyId, Reply>,
    pub(crate) saved_posts: Vec<SavedPost>,
    pub(crate) events: BTreeMap<EventId, CommunityEvent>,

    pub(crate) stories: BTreeMap<StoryId, Story>,
    pub(crate) story_tags: BTreeMap<String, u32>,

    pub(crate) notifications: BTreeMap<NotificationId, Notification>,
    pub(crate) preferences: BTreeMap<UserId, NotificationPreferences>,

    pub(crate) assistant: BTreeMap<UserId, AssistantMemory>,

    #[serde(skip)]
    pub(crate) config: Config,
    #[serde(skip)]
    outbox: Vec<Dispatch>,
}

impl Store {
    /// Empty store with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the active configuration (after loading a snapshot)
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Allocate the next id from the shared sequence
    pub(crate) fn next_id<T: From<u64>>(&mut self) -> T {
        self.next_id += 1;
        T::from(self.next_id)
    }

    /// Queue an event for delivery once the current operation completes
    pub(crate) fn dispatch(&mut self, group: impl Into<String>, event: HubEvent) {
        self.outbox.push(Dispatch {
            group: group.into(),
            event,
        });
    }

    /// Take every queued dispatch
    pub fn drain_dispatches(&mut self) -> Vec<Dispatch> {
        std::mem::take(&mut self.outbox)
    }

    /// Dispatches queued but not yet drained
    pub fn pending_dispatches(&self) -> &[Dispatch] {
        &self.outbox
    }

    pub fn user(&self, id: UserId) -> Result<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| LinkError::not_found("user", id))
    }

    pub(crate) fn user_mut(&mut self, id: UserId) -> Result<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("user", id))
    }

    pub(crate) fn ensure_user(&self, id: UserId) -> Result<()> {
        self.user(id).map(|_| ())
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
