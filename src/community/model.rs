use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::types::{
    CommentId, CommunityId, EventId, JoinRequestId, PostId, Ratings, ReplyId, UserId,
};

pub const DEFAULT_TOPIC_COLOR: &str = "bg-gray-600";
pub const MAX_COMMUNITY_NAME_CHARS: usize = 100;
pub const MAX_POST_TITLE_CHARS: usize = 200;
pub const MAX_TOPIC_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityCategory {
    Tech,
    Science,
    Art,
    Gaming,
    Music,
    Sports,
    Education,
    #[default]
    Other,
}

impl FromStr for CommunityCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tech" => Ok(CommunityCategory::Tech),
            "science" => Ok(CommunityCategory::Science),
            "art" => Ok(CommunityCategory::Art),
            "gaming" => Ok(CommunityCategory::Gaming),
            "music" => Ok(CommunityCategory::Music),
            "sports" => Ok(CommunityCategory::Sports),
            "education" => Ok(CommunityCategory::Education),
            "other" => Ok(CommunityCategory::Other),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub color: String,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: DEFAULT_TOPIC_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityRole {
    Admin,
    Moderator,
    Member,
}

impl CommunityRole {
    pub fn can_moderate(&self) -> bool {
        matches!(self, CommunityRole::Admin | CommunityRole::Moderator)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommunityRole::Admin => "admin",
            CommunityRole::Moderator => "moderator",
            CommunityRole::Member => "member",
        }
    }
}

impl FromStr for CommunityRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(CommunityRole::Admin),
            "moderator" => Ok(CommunityRole::Moderator),
            "member" => Ok(CommunityRole::Member),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityMember {
    pub user: UserId,
    pub community: CommunityId,
    pub role: CommunityRole,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub is_active: bool,
    pub contributions: u32,
}

impl CommunityMember {
    pub(crate) fn new(
        user: UserId,
        community: CommunityId,
        role: CommunityRole,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user,
            community,
            role,
            joined_at: now,
            last_active: now,
            is_active: true,
            contributions: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category: CommunityCategory,
    pub topics: Vec<Topic>,
    pub rules: Vec<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub members: Vec<CommunityMember>,
    pub members_count: u32,
    pub online_count: u32,
    pub activity_score: u8,
}

impl Community {
    /// Active membership of `user`
    pub fn member(&self, user: UserId) -> Option<&CommunityMember> {
        self.members.iter().find(|m| m.user == user && m.is_active)
    }

    pub(crate) fn member_mut(&mut self, user: UserId) -> Option<&mut CommunityMember> {
        self.members.iter_mut().find(|m| m.user == user)
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.member(user).is_some()
    }

    pub fn role_of(&self, user: UserId) -> Option<CommunityRole> {
        self.member(user).map(|m| m.role)
    }

    pub fn can_moderate(&self, user: UserId) -> bool {
        self.role_of(user).is_some_and(|r| r.can_moderate())
    }

    pub fn has_topic(&self, name: &str) -> bool {
        self.topics.iter().any(|t| t.name == name)
    }

    pub(crate) fn recount_members(&mut self) {
        self.members_count = self.members.iter().filter(|m| m.is_active).count() as u32;
    }

    /// Replace the topic list, keeping colors of surviving topics
    ///
    /// Returns the names that were removed.
    pub(crate) fn sync_topics(&mut self, names: &[String]) -> Vec<String> {
        let mut wanted: Vec<String> = Vec::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if !wanted.iter().any(|w| w == name) {
                wanted.push(name.to_string());
            }
        }

        let removed = self
            .topics
            .iter()
            .filter(|t| !wanted.contains(&t.name))
            .map(|t| t.name.clone())
            .collect();
        let previous = std::mem::take(&mut self.topics);
        self.topics = wanted
            .into_iter()
            .map(|name| {
                previous
                    .iter()
                    .find(|t| t.name == name)
                    .cloned()
                    .unwrap_or_else(|| Topic::new(name))
            })
            .collect();
        removed
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewCommunity {
    pub name: String,
    pub description: String,
    pub category: CommunityCategory,
    pub topics: Vec<String>,
    pub rules: Vec<String>,
    pub is_private: bool,
}

impl NewCommunity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct CommunityUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<CommunityCategory>,
    pub topics: Option<Vec<String>>,
    pub rules: Option<Vec<String>>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: JoinRequestId,
    pub community: CommunityId,
    pub user: UserId,
    pub status: JoinRequestStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Result of asking to join a community
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Requested(JoinRequestId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostVisibility {
    #[default]
    PersonalPrivate,
    PersonalConnections,
    PersonalPublic,
    Community,
}

impl PostVisibility {
    pub fn is_personal(&self) -> bool {
        !matches!(self, PostVisibility::Community)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: UserId,
    pub community: Option<CommunityId>,
    pub title: String,
    pub content: String,
    pub visibility: PostVisibility,
    pub topics: Vec<String>,
    pub is_pinned: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub view_count: u32,
    pub rating: f64,
    pub total_ratings: u32,
    #[serde(default)]
    pub ratings: Ratings,
    pub comment_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub community: Option<CommunityId>,
    pub title: String,
    pub content: String,
    pub visibility: PostVisibility,
    pub topics: Vec<String>,
}

impl NewPost {
    pub fn personal(
        title: impl Into<String>,
        content: impl Into<String>,
        visibility: PostVisibility,
    ) -> Self {
        Self {
            community: None,
            title: title.into(),
            content: content.into(),
            visibility,
            topics: Vec::new(),
        }
    }

    pub fn in_community(
        community: CommunityId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            community: Some(community),
            title: title.into(),
            content: content.into(),
            visibility: PostVisibility::Community,
            topics: Vec::new(),
        }
    }

    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post: PostId,
    pub author: UserId,
    pub content: String,
    pub is_top_comment: bool,
    pub rating: f64,
    pub total_ratings: u32,
    #[serde(default)]
    pub ratings: Ratings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: ReplyId,
    pub comment: CommentId,
    pub parent_reply: Option<ReplyId>,
    pub author: UserId,
    pub content: String,
    pub rating: f64,
    pub total_ratings: u32,
    #[serde(default)]
    pub ratings: Ratings,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPost {
    pub user: UserId,
    pub post: PostId,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    #[default]
    Discussion,
    Ama,
    Challenge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityEvent {
    pub id: EventId,
    pub community: CommunityId,
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub created_by: UserId,
    pub max_participants: Option<u32>,
    pub participants: BTreeSet<UserId>,
    pub status: EventStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CommunityEvent {
    /// Status implied by the schedule; cancellation is sticky
    pub fn status_at(&self, now: DateTime<Utc>) -> EventStatus {
        if self.status == EventStatus::Cancelled {
            EventStatus::Cancelled
        } else if now < self.start {
            EventStatus::Upcoming
        } else if now < self.end {
            EventStatus::Ongoing
        } else {
            EventStatus::Completed
        }
    }

    pub fn is_full(&self) -> bool {
        self.max_participants
            .is_some_and(|max| self.participants.len() as u32 >= max)
    }
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub community: CommunityId,
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub max_participants: Option<u32>,
}

/// Lowercase ASCII slug with single dashes between words
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "community".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Rust Lovers"), "rust-lovers");
        assert_eq!(slugify("  C++ & Systems!  "), "c-systems");
        assert_eq!(slugify("a__b--c"), "a-b-c");
        assert_eq!(slugify("???"), "community");
    }

    #[test]
    fn test_sync_topics_dedups_and_reports_removed() {
        let now = Utc::now();
        let mut community = Community {
            id: CommunityId(1),
            name: "Rust".to_string(),
            slug: "rust".to_string(),
            description: String::new(),
            category: CommunityCategory::Tech,
            topics: vec![Topic {
                name: "async".to_string(),
                color: "bg-red-600".to_string(),
            }],
            rules: Vec::new(),
            is_private: false,
            created_at: now,
            updated_at: now,
            created_by: None,
            members: Vec::new(),
            members_count: 0,
            online_count: 0,
            activity_score: 0,
        };

        let removed = community.sync_topics(&[
            " async ".to_string(),
            "wasm".to_string(),
            "wasm".to_string(),
            "".to_string(),
        ]);
        assert!(removed.is_empty());
        assert_eq!(community.topics.len(), 2);
        assert_eq!(community.topics[0].color, "bg-red-600");
        assert_eq!(community.topics[1].color, DEFAULT_TOPIC_COLOR);

        let removed = community.sync_topics(&["wasm".to_string()]);
        assert_eq!(removed, vec!["async".to_string()]);
    }

    #[test]
    fn test_event_status_at() {
        let start = Utc::now();
        let mut event = CommunityEvent {
            id: EventId(1),
            community: CommunityId(2),
            title: "AMA".to_string(),
            description: String::new(),
            event_type: EventType::Ama,
            start,
            end: start + Duration::hours(1),
            created_by: UserId(3),
            max_participants: Some(1),
            participants: BTreeSet::new(),
            status: EventStatus::Upcoming,
            is_active: true,
            created_at: start,
        };
        assert_eq!(event.status_at(start - Duration::minutes(1)), EventStatus::Upcoming);
        assert_eq!(event.status_at(start + Duration::minutes(1)), EventStatus::Ongoing);
        assert_eq!(event.status_at(start + Duration::hours(2)), EventStatus::Completed);

        event.participants.insert(UserId(4));
        assert!(event.is_full());
        event.status = EventStatus::Cancelled;
        assert_eq!(event.status_at(start + Duration::minutes(1)), EventStatus::Cancelled);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Gaming".parse::<CommunityCategory>(), Ok(CommunityCategory::Gaming));
        assert!("cooking".parse::<CommunityCategory>().is_err());
    }
}
