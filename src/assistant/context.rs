use chrono::{DateTime, Utc};
use serde::Serialize;

use super::memory::{AssistantMemory, LearningData, PersonalityProfile};
use crate::errors::Result;
use crate::store::Store;
use crate::suggestions::SuggestionSource;
use crate::types::UserId;

const RECENT_POSTS: usize = 5;
const RECENT_NOTIFICATIONS: usize = 10;
const SUGGESTIONS_PER_KIND: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationSummary {
    pub kind: String,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendSummary {
    pub username: String,
    pub full_name: String,
    pub connection_strength: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionSummary {
    pub username: String,
    pub score: u8,
    pub common_interests: Vec<String>,
    pub highlights: Vec<String>,
}

/// Everything the assistant is told about its user
#[derive(Debug, Clone, Serialize)]
pub struct AssistantContext {
    pub username: String,
    pub personality_tags: Vec<String>,
    pub recent_posts: Vec<PostSummary>,
    pub unread_notifications: Vec<NotificationSummary>,
    pub friends: Vec<FriendSummary>,
    pub suggestions: Vec<SuggestionSummary>,
    pub alchemy_suggestions: Vec<SuggestionSummary>,
    pub personality: PersonalityProfile,
    pub learning: LearningData,
}

impl Store {
    pub fn assistant_memory(&self, user: UserId) -> Option<&AssistantMemory> {
        self.assistant.get(&user)
    }

    /// Append to the user's assistant memory, creating it on first use
    pub fn record_assistant_message(
        &mut self,
        user: UserId,
        content: &str,
        is_user_message: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_user(user)?;
        let window = self.config.assistant.context_window;
        let history_limit = self.config.assistant.history_limit;
        self.assistant
            .entry(user)
            .or_insert_with(|| AssistantMemory::new(user))
            .record(content, is_user_message, now, window, history_limit);
        Ok(())
    }

    fn suggestion_summaries(
        &self,
        user: UserId,
        source: SuggestionSource,
    ) -> Vec<SuggestionSummary> {
        self.suggestions_for(user, false)
            .into_iter()
            .filter(|s| s.source == source)
            .take(SUGGESTIONS_PER_KIND)
            .filter_map(|s| {
                let other = self.user(s.suggested_user).ok()?;
                Some(SuggestionSummary {
                    username: other.username.clone(),
                    score: s.score,
                    common_interests: s.common_interests.clone(),
                    highlights: s.match_highlights.clone(),
                })
            })
            .collect()
    }

    pub fn assistant_context(&self, user: UserId) -> Result<AssistantContext> {
        let me = self.user(user)?;

        let mut posts: Vec<_> = self.posts.values().filter(|p| p.author == user).collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let recent_posts = posts
            .into_iter()
            .take(RECENT_POSTS)
            .map(|p| PostSummary {
                title: p.title.clone(),
                content: p.content.clone(),
                created_at: p.created_at,
            })
            .collect();

        let unread_notifications = self
            .notifications_for(user, true, Some(RECENT_NOTIFICATIONS))
            .into_iter()
            .map(|n| NotificationSummary {
                kind: n.notification_type.as_str().to_string(),
                title: n.title.clone(),
                message: n.message.clone(),
                created_at: n.created_at,
            })
            .collect();

        let friends = self
            .connections_of(user)
            .into_iter()
            .filter_map(|c| {
                let friend = self.user(c.other(user)?).ok()?;
                Some(FriendSummary {
                    username: friend.username.clone(),
                    full_name: friend.full_name(),
                    connection_strength: c.connection_strength,
                })
            })
            .collect();

        let (personality, learning) = self
            .assistant_memory(user)
            .map(|m| (m.personality.clone(), m.learning.clone()))
            .unwrap_or_default();

        Ok(AssistantContext {
            username: me.username.clone(),
            personality_tags: me.personality_tags.iter().cloned().collect(),
            recent_posts,
            unread_notifications,
            friends,
            suggestions: self.suggestion_summaries(user, SuggestionSource::Traditional),
            alchemy_suggestions: self.suggestion_summaries(user, SuggestionSource::Alchemy),
            personality,
            learning,
        })
    }
}
