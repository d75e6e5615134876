//! Story operations
//!
//! Stories expire after a configurable time to live, can be locked until an
//! unlock date and may form ordered threads or remix another story.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::model::{
    NewStory, Poll, ReportReason, Story, StoryAnalytics, StoryReport, StoryShare, StoryType,
    StoryView,
};
use crate::errors::{LinkError, Result};
use crate::store::Store;
use crate::types::{shift_hours, StoryId, UserId};

const MIN_POLL_OPTIONS: usize = 2;

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.iter()
        .map(|t| t.trim().trim_start_matches('#').to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        ((part / whole) * 10000.0).round() / 100.0
    }
}

impl Store {
    pub fn story(&self, id: StoryId) -> Result<&Story> {
        self.stories
            .get(&id)
            .ok_or_else(|| LinkError::not_found("story", id))
    }

    fn story_mut(&mut self, id: StoryId) -> Result<&mut Story> {
        self.stories
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("story", id))
    }

    pub fn create_story(
        &mut self,
        author: UserId,
        new: NewStory,
        now: DateTime<Utc>,
    ) -> Result<StoryId> {
        self.ensure_user(author)?;
        let limits = self.config.stories.clone();

        let duration_secs = new.duration_secs.unwrap_or(limits.default_duration_secs);
        if !(limits.min_duration_secs..=limits.max_duration_secs).contains(&duration_secs) {
            return Err(LinkError::invalid(format!(
                "duration must be between {} and {} seconds",
                limits.min_duration_secs, limits.max_duration_secs
            )));
        }

        let content = new.content.trim().to_string();
        if content.is_empty() && new.media_url.is_none() {
            return Err(LinkError::invalid("a story needs content or media"));
        }
        if let Some(location) = &new.location {
            if !location.is_valid() {
                return Err(LinkError::invalid("location coordinates are out of range"));
            }
        } else if new.story_type == StoryType::Location {
            return Err(LinkError::invalid("location stories need a location"));
        }
        if new.story_type == StoryType::Timecapsule && new.unlock_date.is_none() {
            return Err(LinkError::invalid("time capsules need an unlock date"));
        }

        let poll = if new.story_type == StoryType::Poll {
            let options: Vec<String> = new
                .poll_options
                .iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if options.len() < MIN_POLL_OPTIONS {
                return Err(LinkError::invalid("polls need at least two options"));
            }
            if new.correct_answer.is_some_and(|i| i >= options.len()) {
                return Err(LinkError::invalid("correct answer is not one of the options"));
            }
            Some(Poll {
                options,
                votes: Default::default(),
                correct_answer: new.correct_answer,
            })
        } else {
            None
        };

        if new.story_type == StoryType::AiRemix {
            let original = new
                .original_story
                .ok_or_else(|| LinkError::invalid("a remix needs an original story"))?;
            self.story(original)?;
        }

        let id = StoryId::new();
        let (thread_id, thread_order) = match new.parent_story {
            Some(parent_id) => {
                let parent = self.story(parent_id)?;
                let thread = parent.thread_id.unwrap_or(parent.id);
                let next = self
                    .stories
                    .values()
                    .filter(|s| s.thread_id == Some(thread) || s.id == thread)
                    .map(|s| s.thread_order)
                    .max()
                    .map_or(0, |order| order + 1);
                (Some(thread), next)
            }
            None if new.story_type == StoryType::StoryThread => (Some(id), 0),
            None => (None, 0),
        };

        let expires_at = match new.expires_at {
            Some(at) => at,
            None => shift_hours(now, limits.default_ttl_hours)?,
        };

        let tags = normalize_tags(&new.tags);
        for tag in &tags {
            *self.story_tags.entry(tag.clone()).or_insert(0) += 1;
        }
        self.stories.insert(
            id,
            Story {
                id,
                author,
                story_type: new.story_type,
                content,
                theme: new.theme,
                media_url: new.media_url,
                duration_secs,
                location: new.location,
                unlock_date: new.unlock_date,
                parent_story: new.parent_story,
                thread_id,
                thread_title: new.thread_title,
                thread_order,
                original_story: new.original_story,
                ai_style: new.ai_style,
                tags,
                created_at: now,
                updated_at: now,
                expires_at,
                is_active: true,
                is_public: new.is_public,
                allow_sharing: new.allow_sharing,
                views_count: 0,
                shares_count: 0,
                rating: 0.0,
                total_ratings: 0,
                poll,
                collaborators: BTreeSet::new(),
                ratings: Default::default(),
                views: Vec::new(),
                shares: Vec::new(),
                bookmarks: BTreeSet::new(),
                reports: Vec::new(),
            },
        );
        info!(story_id = %id, author_id = %author, "story created");
        Ok(id)
    }

    fn story_visible_to(&self, story: &Story, viewer: UserId, now: DateTime<Utc>) -> bool {
        if !story.is_active || story.is_expired(now) {
            return false;
        }
        if story.author == viewer {
            return true;
        }
        story.is_unlocked(now)
            && (story.is_public
                || story.collaborators.contains(&viewer)
                || self.are_connected(story.author, viewer))
    }

    pub fn can_view_story(&self, viewer: UserId, id: StoryId, now: DateTime<Utc>) -> Result<bool> {
        let story = self.story(id)?;
        Ok(self.story_visible_to(story, viewer, now))
    }

    fn ensure_story_visible(&self, viewer: UserId, id: StoryId, now: DateTime<Utc>) -> Result<()> {
        if self.can_view_story(viewer, id, now)? {
            Ok(())
        } else {
            Err(LinkError::denied("story is not available to you"))
        }
    }

    /// Record or refresh the viewer's single view row
    pub fn view_story(
        &mut self,
        viewer: UserId,
        id: StoryId,
        view_duration: u32,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        self.ensure_user(viewer)?;
        self.ensure_story_visible(viewer, id, now)?;
        let story = self.story_mut(id)?;
        match story.views.iter_mut().find(|v| v.user == viewer) {
            Some(view) => {
                view.view_duration = view_duration;
                view.completed = view.completed || completed;
                view.viewed_at = now;
            }
            None => story.views.push(StoryView {
                user: viewer,
                viewed_at: now,
                view_duration,
                completed,
            }),
        }
        story.views_count = story.views.len() as u32;
        Ok(story.views_count)
    }

    pub fn rate_story(
        &mut self,
        user: UserId,
        id: StoryId,
        value: u8,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        self.ensure_user(user)?;
        self.ensure_story_visible(user, id, now)?;
        let story = self.story_mut(id)?;
        story.ratings.rate(user, value)?;
        story.rating = story.ratings.average();
        story.total_ratings = story.ratings.total();
        Ok(story.rating)
    }

    pub fn share_story(
        &mut self,
        user: UserId,
        id: StoryId,
        platform: &str,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        self.ensure_user(user)?;
        self.ensure_story_visible(user, id, now)?;
        let story = self.story_mut(id)?;
        if !story.allow_sharing {
            return Err(LinkError::denied("sharing is disabled for this story"));
        }
        story.shares.push(StoryShare {
            user,
            platform: platform.trim().to_string(),
            created_at: now,
        });
        story.shares_count = story.shares.len() as u32;
        Ok(story.shares_count)
    }

    /// Cast a single vote; returns the updated per-option counts
    pub fn vote_poll(
        &mut self,
        user: UserId,
        id: StoryId,
        option: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<u32>> {
        self.ensure_user(user)?;
        self.ensure_story_visible(user, id, now)?;
        let poll = self
            .story_mut(id)?
            .poll
            .as_mut()
            .ok_or_else(|| LinkError::invalid("story has no poll"))?;
        if option >= poll.options.len() {
            return Err(LinkError::invalid(format!(
                "option {} is out of range",
                option
            )));
        }
        if poll.votes.contains_key(&user) {
            return Err(LinkError::conflict("already voted in this poll"));
        }
        poll.votes.insert(user, option);
        Ok(poll.results())
    }

    /// `false` when already bookmarked
    pub fn bookmark_story(&mut self, user: UserId, id: StoryId, now: DateTime<Utc>) -> Result<bool> {
        self.ensure_user(user)?;
        self.ensure_story_visible(user, id, now)?;
        Ok(self.story_mut(id)?.bookmarks.insert(user))
    }

    pub fn remove_bookmark(&mut self, user: UserId, id: StoryId) -> Result<bool> {
        Ok(self.story_mut(id)?.bookmarks.remove(&user))
    }

    pub fn bookmarked_stories(&self, user: UserId, now: DateTime<Utc>) -> Vec<&Story> {
        self.stories
            .values()
            .filter(|s| s.bookmarks.contains(&user) && self.story_visible_to(s, user, now))
            .collect()
    }

    pub fn report_story(
        &mut self,
        reporter: UserId,
        id: StoryId,
        reason: ReportReason,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_user(reporter)?;
        let story = self.story_mut(id)?;
        if story.author == reporter {
            return Err(LinkError::invalid("cannot report your own story"));
        }
        if story.reports.iter().any(|r| r.reporter == reporter) {
            return Err(LinkError::conflict("story already reported"));
        }
        story.reports.push(StoryReport {
            reporter,
            reason,
            description: description.trim().to_string(),
            created_at: now,
            is_resolved: false,
        });
        info!(story_id = %id, reason = ?reason, "story reported");
        Ok(())
    }

    pub fn add_collaborator(&mut self, actor: UserId, id: StoryId, user: UserId) -> Result<bool> {
        self.ensure_user(user)?;
        let story = self.story_mut(id)?;
        if story.author != actor {
            return Err(LinkError::denied("only the author can add collaborators"));
        }
        if user == actor {
            return Err(LinkError::invalid("the author is not a collaborator"));
        }
        Ok(story.collaborators.insert(user))
    }

    /// Soft delete
    pub fn delete_story(&mut self, actor: UserId, id: StoryId) -> Result<()> {
        let story = self.story_mut(id)?;
        if story.author != actor {
            return Err(LinkError::denied("only the author can delete a story"));
        }
        story.is_active = false;
        story.updated_at = Utc::now();
        Ok(())
    }

    /// Viewable stories, newest first
    pub fn story_feed(&self, viewer: UserId, now: DateTime<Utc>) -> Vec<&Story> {
        let mut feed: Vec<&Story> = self
            .stories
            .values()
            .filter(|s| self.story_visible_to(s, viewer, now))
            .collect();
        feed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        feed
    }

    pub fn stories_by(&self, author: UserId) -> Vec<&Story> {
        let mut stories: Vec<&Story> = self.stories.values().filter(|s| s.author == author).collect();
        stories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        stories
    }

    /// Stories of a thread in reading order
    pub fn thread_stories(&self, thread: StoryId) -> Vec<&Story> {
        let mut stories: Vec<&Story> = self
            .stories
            .values()
            .filter(|s| s.thread_id == Some(thread) || s.id == thread)
            .filter(|s| s.is_active)
            .collect();
        stories.sort_by_key(|s| (s.thread_order, s.created_at));
        stories
    }

    pub fn story_analytics(&self, id: StoryId) -> Result<StoryAnalytics> {
        let story = self.story(id)?;
        let total_views = story.views.len() as u32;
        let unique_views = story
            .views
            .iter()
            .map(|v| v.user)
            .collect::<BTreeSet<_>>()
            .len() as u32;
        let avg_view_duration = if total_views == 0 {
            0.0
        } else {
            let sum: u64 = story.views.iter().map(|v| u64::from(v.view_duration)).sum();
            sum as f64 / f64::from(total_views)
        };
        let completed = story.views.iter().filter(|v| v.completed).count();

        Ok(StoryAnalytics {
            total_views,
            unique_views,
            avg_view_duration,
            completion_rate: percent(completed as f64, f64::from(total_views)),
            engagement_rate: percent(f64::from(story.shares_count), f64::from(unique_views)),
            shares_count: story.shares_count,
        })
    }

    /// Deactivate every expired story; returns how many were touched
    pub fn expire_stories(&mut self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for story in self.stories.values_mut() {
            if story.is_active && story.is_expired(now) {
                story.is_active = false;
                story.updated_at = now;
                expired += 1;
            }
        }
        if expired > 0 {
            debug!(expired, "stories expired");
        }
        expired
    }

    /// Most used tags, ties broken by name
    pub fn popular_tags(&self, limit: usize) -> Vec<(String, u32)> {
        let mut tags: Vec<(String, u32)> = self
            .story_tags
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        tags.truncate(limit);
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stories::{Location, StoryTheme};
    use chrono::Duration;
    use crate::users::NewUser;

    fn setup() -> (Store, UserId, UserId) {
        let mut store = Store::default();
        let ada = store.register_user(NewUser::new("ada", "ada@x.io")).unwrap();
        let bob = store.register_user(NewUser::new("bob", "bob@x.io")).unwrap();
        (store, ada, bob)
    }

    #[test]
    fn test_create_defaults() {
        let (mut store, ada, _) = setup();
        let now = Utc::now();
        let id = store
            .create_story(ada, NewStory::text("hello").tags(["#Rust", "rust", " travel "]), now)
            .unwrap();
        let story = store.story(id).unwrap();
        assert_eq!(story.duration_secs, 15);
        assert_eq!(story.expires_at, now + Duration::hours(24));
        assert_eq!(story.tags, vec!["rust".to_string(), "travel".to_string()]);
        assert_eq!(story.theme, StoryTheme::Personal);
        assert_eq!(store.popular_tags(1), vec![("rust".to_string(), 1)]);
    }

    #[test]
    fn test_create_rejects_unrepresentable_ttl() {
        let (mut store, ada, _) = setup();
        store.config.stories.default_ttl_hours = i64::MAX / 2;

        let err = store
            .create_story(ada, NewStory::text("forever").tags(["rust"]), Utc::now())
            .unwrap_err();
        assert!(matches!(err, LinkError::Validation(_)));
        assert!(store.popular_tags(5).is_empty());
        assert!(store.stories_by(ada).is_empty());
    }

    #[test]
    fn test_create_validation() {
        let (mut store, ada, _) = setup();
        let now = Utc::now();
        let mut short = NewStory::text("x");
        short.duration_secs = Some(4);
        assert!(store.create_story(ada, short, now).is_err());
        assert!(store.create_story(ada, NewStory::text("  "), now).is_err());
        assert!(store
            .create_story(ada, NewStory::poll("Tea?", ["yes"]), now)
            .is_err());

        let mut remix = NewStory::text("remix");
        remix.story_type = StoryType::AiRemix;
        assert!(store.create_story(ada, remix.clone(), now).is_err());
        remix.original_story = Some(StoryId::new());
        assert!(matches!(
            store.create_story(ada, remix, now),
            Err(LinkError::NotFound { .. })
        ));

        let mut place = NewStory::text("here");
        place.story_type = StoryType::Location;
        assert!(store.create_story(ada, place.clone(), now).is_err());
        place.location = Some(Location {
            name: "Lisbon".to_string(),
            latitude: 38.7,
            longitude: -9.1,
        });
        assert!(store.create_story(ada, place, now).is_ok());
    }

    #[test]
    fn test_thread_ordering() {
        let (mut store, ada, _) = setup();
        let now = Utc::now();
        let mut start = NewStory::text("part one");
        start.story_type = StoryType::StoryThread;
        let root = store.create_story(ada, start, now).unwrap();
        assert_eq!(store.story(root).unwrap().thread_id, Some(root));

        let mut second = NewStory::text("part two");
        second.parent_story = Some(root);
        let second = store.create_story(ada, second, now).unwrap();
        let mut third = NewStory::text("part three");
        third.parent_story = Some(second);
        let third = store.create_story(ada, third, now).unwrap();

        assert_eq!(store.story(third).unwrap().thread_id, Some(root));
        let order: Vec<u32> = store
            .thread_stories(root)
            .iter()
            .map(|s| s.thread_order)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_visibility() {
        let (mut store, ada, bob) = setup();
        let now = Utc::now();
        let mut private = NewStory::text("secret");
        private.is_public = false;
        let private = store.create_story(ada, private, now).unwrap();
        assert!(!store.can_view_story(bob, private, now).unwrap());
        store.add_collaborator(ada, private, bob).unwrap();
        assert!(store.can_view_story(bob, private, now).unwrap());

        let mut capsule = NewStory::text("later");
        capsule.story_type = StoryType::Timecapsule;
        capsule.unlock_date = Some(now + Duration::hours(1));
        let capsule = store.create_story(ada, capsule, now).unwrap();
        assert!(!store.can_view_story(bob, capsule, now).unwrap());
        assert!(store.can_view_story(ada, capsule, now).unwrap());
        assert!(store
            .can_view_story(bob, capsule, now + Duration::hours(2))
            .unwrap());
        assert!(!store
            .can_view_story(bob, capsule, now + Duration::hours(25))
            .unwrap());
    }

    #[test]
    fn test_views_and_analytics() {
        let (mut store, ada, bob) = setup();
        let now = Utc::now();
        let id = store.create_story(ada, NewStory::text("hi"), now).unwrap();
        store.view_story(bob, id, 10, false, now).unwrap();
        assert_eq!(store.view_story(bob, id, 15, true, now).unwrap(), 1);
        store.view_story(ada, id, 5, false, now).unwrap();
        store.share_story(bob, id, "mastodon", now).unwrap();

        let analytics = store.story_analytics(id).unwrap();
        assert_eq!(analytics.total_views, 2);
        assert_eq!(analytics.unique_views, 2);
        assert_eq!(analytics.avg_view_duration, 10.0);
        assert_eq!(analytics.completion_rate, 50.0);
        assert_eq!(analytics.engagement_rate, 50.0);
    }

    #[test]
    fn test_poll_votes_once() {
        let (mut store, ada, bob) = setup();
        let now = Utc::now();
        let id = store
            .create_story(ada, NewStory::poll("Tea?", ["yes", "no"]), now)
            .unwrap();
        assert!(store.vote_poll(bob, id, 2, now).is_err());
        assert_eq!(store.vote_poll(bob, id, 1, now).unwrap(), vec![0, 1]);
        assert!(matches!(
            store.vote_poll(bob, id, 0, now),
            Err(LinkError::Conflict(_))
        ));
    }

    #[test]
    fn test_sharing_reports_and_bookmarks() {
        let (mut store, ada, bob) = setup();
        let now = Utc::now();
        let mut locked = NewStory::text("no sharing");
        locked.allow_sharing = false;
        let id = store.create_story(ada, locked, now).unwrap();
        assert!(store.share_story(bob, id, "x", now).is_err());

        assert!(store.report_story(ada, id, ReportReason::Spam, "", now).is_err());
        store
            .report_story(bob, id, ReportReason::Spam, "ads", now)
            .unwrap();
        assert!(store
            .report_story(bob, id, ReportReason::Other, "", now)
            .is_err());

        assert!(store.bookmark_story(bob, id, now).unwrap());
        assert!(!store.bookmark_story(bob, id, now).unwrap());
        assert_eq!(store.bookmarked_stories(bob, now).len(), 1);
        assert!(store.remove_bookmark(bob, id).unwrap());
    }

    #[test]
    fn test_rating_and_delete() {
        let (mut store, ada, bob) = setup();
        let now = Utc::now();
        let id = store.create_story(ada, NewStory::text("rate me"), now).unwrap();
        assert_eq!(store.rate_story(bob, id, 4, now).unwrap(), 4.0);
        assert_eq!(store.rate_story(ada, id, 5, now).unwrap(), 4.5);
        assert!(store.delete_story(bob, id).is_err());
        store.delete_story(ada, id).unwrap();
        assert!(store.story_feed(bob, now).is_empty());
    }

    #[test]
    fn test_expire_stories_and_feed_order() {
        let (mut store, ada, bob) = setup();
        let now = Utc::now();
        let old = store
            .create_story(ada, NewStory::text("old"), now - Duration::hours(30))
            .unwrap();
        let newer = store
            .create_story(ada, NewStory::text("new"), now - Duration::hours(1))
            .unwrap();
        let newest = store.create_story(ada, NewStory::text("newest"), now).unwrap();

        let feed: Vec<StoryId> = store.story_feed(bob, now).iter().map(|s| s.id).collect();
        assert_eq!(feed, vec![newest, newer]);
        assert_eq!(store.expire_stories(now), 1);
        assert!(!store.story(old).unwrap().is_active);
        assert_eq!(store.expire_stories(now), 0);
    }
}
