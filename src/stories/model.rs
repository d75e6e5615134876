use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Ratings, StoryId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoryType {
    #[default]
    Image,
    Video,
    Audio,
    Text,
    Poll,
    Location,
    Timecapsule,
    Collaborative,
    AiRemix,
    StoryThread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryTheme {
    #[default]
    Personal,
    Travel,
    Food,
    Art,
    Wellness,
    Social,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub options: Vec<String>,
    pub votes: BTreeMap<UserId, usize>,
    pub correct_answer: Option<usize>,
}

impl Poll {
    /// Vote count per option, in option order
    pub fn results(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.options.len()];
        for &choice in self.votes.values() {
            if let Some(count) = counts.get_mut(choice) {
                *count += 1;
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryView {
    pub user: UserId,
    pub viewed_at: DateTime<Utc>,
    /// Seconds watched
    pub view_duration: u32,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportReason {
    Inappropriate,
    Spam,
    Harassment,
    Copyright,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryReport {
    pub reporter: UserId,
    pub reason: ReportReason,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub is_resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryShare {
    pub user: UserId,
    pub platform: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub author: UserId,
    pub story_type: StoryType,
    pub content: String,
    pub theme: StoryTheme,
    pub media_url: Option<String>,
    pub duration_secs: u32,
    pub location: Option<Location>,
    pub unlock_date: Option<DateTime<Utc>>,
    pub parent_story: Option<StoryId>,
    pub thread_id: Option<StoryId>,
    pub thread_title: Option<String>,
    pub thread_order: u32,
    pub original_story: Option<StoryId>,
    pub ai_style: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_public: bool,
    pub allow_sharing: bool,
    pub views_count: u32,
    pub shares_count: u32,
    pub rating: f64,
    pub total_ratings: u32,
    pub poll: Option<Poll>,
    pub collaborators: BTreeSet<UserId>,
    #[serde(default)]
    pub ratings: Ratings,
    #[serde(default)]
    pub views: Vec<StoryView>,
    #[serde(default)]
    pub shares: Vec<StoryShare>,
    #[serde(default)]
    pub bookmarks: BTreeSet<UserId>,
    #[serde(default)]
    pub reports: Vec<StoryReport>,
}

impl Story {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_unlocked(&self, now: DateTime<Utc>) -> bool {
        self.unlock_date.map_or(true, |unlock| now >= unlock)
    }
}

/// Input for a new story; `None` fields fall back to configured defaults
#[derive(Debug, Clone)]
pub struct NewStory {
    pub story_type: StoryType,
    pub content: String,
    pub theme: StoryTheme,
    pub media_url: Option<String>,
    pub duration_secs: Option<u32>,
    pub location: Option<Location>,
    pub unlock_date: Option<DateTime<Utc>>,
    pub parent_story: Option<StoryId>,
    pub thread_title: Option<String>,
    pub original_story: Option<StoryId>,
    pub ai_style: Option<String>,
    pub tags: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub allow_sharing: bool,
    pub poll_options: Vec<String>,
    pub correct_answer: Option<usize>,
}

impl Default for NewStory {
    fn default() -> Self {
        Self {
            story_type: StoryType::default(),
            content: String::new(),
            theme: StoryTheme::default(),
            media_url: None,
            duration_secs: None,
            location: None,
            unlock_date: None,
            parent_story: None,
            thread_title: None,
            original_story: None,
            ai_style: None,
            tags: Vec::new(),
            expires_at: None,
            is_public: true,
            allow_sharing: true,
            poll_options: Vec::new(),
            correct_answer: None,
        }
    }
}

impl NewStory {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            story_type: StoryType::Text,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn poll<I, S>(question: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            story_type: StoryType::Poll,
            content: question.into(),
            poll_options: options.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryAnalytics {
    pub total_views: u32,
    pub unique_views: u32,
    pub avg_view_duration: f64,
    pub completion_rate: f64,
    pub engagement_rate: f64,
    pub shares_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_type_serialization() {
        assert_eq!(
            serde_json::to_string(&StoryType::AiRemix).unwrap(),
            "\"ai-remix\""
        );
        assert_eq!(
            serde_json::to_string(&StoryType::Timecapsule).unwrap(),
            "\"timecapsule\""
        );
        let parsed: StoryType = serde_json::from_str("\"story-thread\"").unwrap();
        assert_eq!(parsed, StoryType::StoryThread);
    }

    #[test]
    fn test_poll_results_ignore_out_of_range() {
        let mut poll = Poll {
            options: vec!["yes".to_string(), "no".to_string()],
            votes: BTreeMap::new(),
            correct_answer: None,
        };
        poll.votes.insert(UserId(1), 0);
        poll.votes.insert(UserId(2), 0);
        poll.votes.insert(UserId(3), 1);
        poll.votes.insert(UserId(4), 7);
        assert_eq!(poll.results(), vec![2, 1]);
    }

    #[test]
    fn test_location_bounds() {
        let ok = Location {
            name: "Oslo".to_string(),
            latitude: 59.9,
            longitude: 10.7,
        };
        assert!(ok.is_valid());
        let bad = Location {
            latitude: 91.0,
            ..ok
        };
        assert!(!bad.is_valid());
    }
}
