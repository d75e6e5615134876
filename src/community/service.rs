//! Community, post, discussion and event operations

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::model::{
    slugify, Comment, Community, CommunityEvent, CommunityMember, CommunityRole, CommunityUpdate,
    EventStatus, JoinOutcome, JoinRequest, JoinRequestStatus, NewCommunity, NewEvent, NewPost,
    Post, PostVisibility, Reply, SavedPost, MAX_COMMUNITY_NAME_CHARS, MAX_POST_TITLE_CHARS,
    MAX_TOPIC_CHARS,
};
use crate::errors::{LinkError, Result};
use crate::notifications::{NewNotification, NotificationType};
use crate::realtime::{group, HubEvent};
use crate::store::Store;
use crate::types::{CommentId, CommunityId, EventId, JoinRequestId, PostId, ReplyId, UserId};

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LinkError::invalid("community name is required"));
    }
    if name.chars().count() > MAX_COMMUNITY_NAME_CHARS {
        return Err(LinkError::invalid(format!(
            "community name exceeds {} characters",
            MAX_COMMUNITY_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

fn validate_topics(topics: &[String]) -> Result<()> {
    match topics
        .iter()
        .find(|t| t.trim().chars().count() > MAX_TOPIC_CHARS)
    {
        Some(t) => Err(LinkError::invalid(format!(
            "topic '{}' exceeds {} characters",
            t.trim(),
            MAX_TOPIC_CHARS
        ))),
        None => Ok(()),
    }
}

fn non_empty(text: &str, what: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(LinkError::invalid(format!("{} cannot be empty", what)));
    }
    Ok(text.to_string())
}

fn validate_title(title: &str) -> Result<String> {
    let title = non_empty(title, "title")?;
    if title.chars().count() > MAX_POST_TITLE_CHARS {
        return Err(LinkError::invalid(format!(
            "title exceeds {} characters",
            MAX_POST_TITLE_CHARS
        )));
    }
    Ok(title)
}

fn has_other_admin(community: &Community, user: UserId) -> bool {
    community
        .members
        .iter()
        .any(|m| m.is_active && m.user != user && m.role == CommunityRole::Admin)
}

impl Store {
    pub fn community(&self, id: CommunityId) -> Result<&Community> {
        self.communities
            .get(&id)
            .ok_or_else(|| LinkError::not_found("community", id))
    }

    fn community_mut(&mut self, id: CommunityId) -> Result<&mut Community> {
        self.communities
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("community", id))
    }

    pub fn community_by_slug(&self, slug: &str) -> Result<&Community> {
        self.communities
            .values()
            .find(|c| c.slug == slug)
            .ok_or_else(|| LinkError::not_found("community", slug))
    }

    /// Communities ordered by size, then activity
    pub fn list_communities(&self) -> Vec<&Community> {
        let mut list: Vec<&Community> = self.communities.values().collect();
        list.sort_by(|a, b| {
            b.members_count
                .cmp(&a.members_count)
                .then(b.activity_score.cmp(&a.activity_score))
                .then(a.id.cmp(&b.id))
        });
        list
    }

    pub fn communities_of(&self, user: UserId) -> Vec<&Community> {
        self.communities
            .values()
            .filter(|c| c.is_member(user))
            .collect()
    }

    pub fn community_members(&self, id: CommunityId) -> Result<Vec<&CommunityMember>> {
        Ok(self
            .community(id)?
            .members
            .iter()
            .filter(|m| m.is_active)
            .collect())
    }

    fn unique_slug(&self, name: &str) -> String {
        let base = slugify(name);
        let taken = |slug: &str| self.communities.values().any(|c| c.slug == slug);
        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn require_moderator(&self, community: CommunityId, actor: UserId) -> Result<()> {
        if self.community(community)?.can_moderate(actor) {
            Ok(())
        } else {
            Err(LinkError::denied("requires community admin or moderator"))
        }
    }

    fn require_admin(&self, community: CommunityId, actor: UserId) -> Result<()> {
        if self.community(community)?.role_of(actor) == Some(CommunityRole::Admin) {
            Ok(())
        } else {
            Err(LinkError::denied("requires community admin"))
        }
    }

    pub fn create_community(&mut self, creator: UserId, new: NewCommunity) -> Result<CommunityId> {
        self.ensure_user(creator)?;
        let name = validate_name(&new.name)?;
        validate_topics(&new.topics)?;

        let id = self.next_id();
        let now = Utc::now();
        let mut community = Community {
            id,
            slug: self.unique_slug(&name),
            name,
            description: new.description.trim().to_string(),
            category: new.category,
            topics: Vec::new(),
            rules: new.rules,
            is_private: new.is_private,
            created_at: now,
            updated_at: now,
            created_by: Some(creator),
            members: vec![CommunityMember::new(creator, id, CommunityRole::Admin, now)],
            members_count: 0,
            online_count: 0,
            activity_score: 0,
        };
        community.sync_topics(&new.topics);
        community.recount_members();

        info!(community_id = %id, slug = %community.slug, "community created");
        self.communities.insert(id, community);
        Ok(id)
    }

    pub fn update_community(
        &mut self,
        actor: UserId,
        id: CommunityId,
        update: CommunityUpdate,
    ) -> Result<()> {
        self.require_admin(id, actor)?;
        let name = update.name.as_deref().map(validate_name).transpose()?;
        if let Some(topics) = &update.topics {
            validate_topics(topics)?;
        }

        let community = self.community_mut(id)?;
        if let Some(name) = name {
            community.name = name;
        }
        if let Some(description) = update.description {
            community.description = description.trim().to_string();
        }
        if let Some(category) = update.category {
            community.category = category;
        }
        if let Some(rules) = update.rules {
            community.rules = rules;
        }
        if let Some(is_private) = update.is_private {
            community.is_private = is_private;
        }
        let removed = update
            .topics
            .map(|topics| community.sync_topics(&topics))
            .unwrap_or_default();
        community.updated_at = Utc::now();

        if !removed.is_empty() {
            for post in self.posts.values_mut().filter(|p| p.community == Some(id)) {
                post.topics.retain(|t| !removed.contains(t));
            }
            debug!(community_id = %id, removed = removed.len(), "topics detached from posts");
        }
        Ok(())
    }

    fn add_community_member(&mut self, id: CommunityId, user: UserId) -> Result<()> {
        let now = Utc::now();
        let community = self.community_mut(id)?;
        match community.member_mut(user) {
            Some(existing) => {
                existing.is_active = true;
                existing.role = CommunityRole::Member;
                existing.last_active = now;
            }
            None => community
                .members
                .push(CommunityMember::new(user, id, CommunityRole::Member, now)),
        }
        community.recount_members();
        let slug = community.slug.clone();
        self.dispatch(
            group::community(&slug),
            HubEvent::MemberJoined {
                user_id: user,
                scope: "community".to_string(),
            },
        );
        Ok(())
    }

    /// Join a public community or file a request for a private one
    pub fn join_community(
        &mut self,
        user: UserId,
        id: CommunityId,
        message: &str,
    ) -> Result<JoinOutcome> {
        self.ensure_user(user)?;
        let community = self.community(id)?;
        if community.is_member(user) {
            return Err(LinkError::conflict("already a member of this community"));
        }

        if !community.is_private {
            self.add_community_member(id, user)?;
            info!(community_id = %id, user_id = %user, "joined community");
            return Ok(JoinOutcome::Joined);
        }

        let pending = self.join_requests.values().any(|r| {
            r.community == id && r.user == user && r.status == JoinRequestStatus::Pending
        });
        if pending {
            return Err(LinkError::conflict("a join request is already pending"));
        }

        let admins: Vec<UserId> = community
            .members
            .iter()
            .filter(|m| m.is_active && m.role == CommunityRole::Admin)
            .map(|m| m.user)
            .collect();
        let community_name = community.name.clone();
        let requester = self.user(user)?.username.clone();

        let request_id: JoinRequestId = self.next_id();
        self.join_requests.insert(
            request_id,
            JoinRequest {
                id: request_id,
                community: id,
                user,
                status: JoinRequestStatus::Pending,
                message: message.trim().to_string(),
                created_at: Utc::now(),
            },
        );
        for admin in admins {
            self.notify(
                NewNotification::new(
                    admin,
                    NotificationType::CommunityJoin,
                    "New join request",
                    format!("{} wants to join {}", requester, community_name),
                )
                .sender(user)
                .data(json!({
                    "community_id": id,
                    "request_id": request_id,
                })),
            )?;
        }
        Ok(JoinOutcome::Requested(request_id))
    }

    pub fn join_request(&self, id: JoinRequestId) -> Result<&JoinRequest> {
        self.join_requests
            .get(&id)
            .ok_or_else(|| LinkError::not_found("join request", id))
    }

    pub fn pending_join_requests(&self, community: CommunityId) -> Vec<&JoinRequest> {
        self.join_requests
            .values()
            .filter(|r| r.community == community && r.status == JoinRequestStatus::Pending)
            .collect()
    }

    pub fn resolve_join_request(
        &mut self,
        actor: UserId,
        id: JoinRequestId,
        accept: bool,
    ) -> Result<()> {
        let request = self.join_request(id)?;
        let (community, user, status) = (request.community, request.user, request.status);
        self.require_moderator(community, actor)?;
        if status != JoinRequestStatus::Pending {
            return Err(LinkError::InvalidState {
                entity: "join request",
                from: format!("{:?}", status).to_lowercase(),
                action: if accept { "accept" } else { "reject" },
            });
        }

        if let Some(request) = self.join_requests.get_mut(&id) {
            request.status = if accept {
                JoinRequestStatus::Accepted
            } else {
                JoinRequestStatus::Rejected
            };
        }
        if accept {
            self.add_community_member(community, user)?;
        }

        let name = self.community(community)?.name.clone();
        let (kind, title, message) = if accept {
            (
                NotificationType::CommunityJoinAccepted,
                "Join request accepted",
                format!("You are now a member of {}", name),
            )
        } else {
            (
                NotificationType::CommunityJoinRejected,
                "Join request declined",
                format!("Your request to join {} was declined", name),
            )
        };
        self.notify(
            NewNotification::new(user, kind, title, message)
                .sender(actor)
                .data(json!({ "community_id": community })),
        )?;
        info!(request_id = %id, accepted = accept, "join request resolved");
        Ok(())
    }

    pub fn leave_community(&mut self, user: UserId, id: CommunityId) -> Result<()> {
        let community = self.community(id)?;
        let role = community
            .role_of(user)
            .ok_or_else(|| LinkError::invalid("not a member of this community"))?;
        if role == CommunityRole::Admin {
            let others = community.members.iter().any(|m| m.is_active && m.user != user);
            if others && !has_other_admin(community, user) {
                return Err(LinkError::InvalidState {
                    entity: "community",
                    from: "sole admin".to_string(),
                    action: "leave",
                });
            }
        }

        let community = self.community_mut(id)?;
        community.members.retain(|m| m.user != user);
        community.recount_members();
        for event in self.events.values_mut().filter(|e| e.community == id) {
            event.participants.remove(&user);
        }
        info!(community_id = %id, user_id = %user, "left community");
        Ok(())
    }

    pub fn set_community_role(
        &mut self,
        actor: UserId,
        id: CommunityId,
        user: UserId,
        role: CommunityRole,
    ) -> Result<()> {
        self.require_admin(id, actor)?;
        let community = self.community(id)?;
        let current = community
            .role_of(user)
            .ok_or_else(|| LinkError::invalid("user is not a member of this community"))?;
        if current == CommunityRole::Admin
            && role != CommunityRole::Admin
            && !has_other_admin(community, user)
        {
            return Err(LinkError::InvalidState {
                entity: "community",
                from: "sole admin".to_string(),
                action: "demote",
            });
        }

        let community = self.community_mut(id)?;
        let member = community
            .member_mut(user)
            .filter(|m| m.is_active)
            .ok_or_else(|| LinkError::invalid("user is not a member of this community"))?;
        member.role = role;
        let name = community.name.clone();

        self.notify(
            NewNotification::new(
                user,
                NotificationType::CommunityRoleChange,
                "Community role updated",
                format!("You are now a {} of {}", role.as_str(), name),
            )
            .sender(actor)
            .data(json!({ "community_id": id, "role": role.as_str() })),
        )?;
        Ok(())
    }

    /// Track live subscribers of a community room
    pub fn adjust_community_online(&mut self, id: CommunityId, online: bool) -> Result<u32> {
        let community = self.community_mut(id)?;
        community.online_count = if online {
            community.online_count.saturating_add(1)
        } else {
            community.online_count.saturating_sub(1)
        };
        Ok(community.online_count)
    }

    /// Share of active members who contributed in the last week, 0..=100
    pub fn refresh_activity_score(&mut self, id: CommunityId, now: DateTime<Utc>) -> Result<u8> {
        let week_ago = now - chrono::Duration::days(7);
        let authors: BTreeSet<UserId> = self
            .posts
            .values()
            .filter(|p| p.community == Some(id) && p.created_at >= week_ago)
            .map(|p| p.author)
            .collect();
        let community = self.community_mut(id)?;
        let active = community.members.iter().filter(|m| m.is_active).count();
        let score = if active == 0 {
            0
        } else {
            let contributing = community
                .members
                .iter()
                .filter(|m| m.is_active && authors.contains(&m.user))
                .count();
            ((contributing * 100) / active).min(100) as u8
        };
        community.activity_score = score;
        Ok(score)
    }

    pub fn post(&self, id: PostId) -> Result<&Post> {
        self.posts
            .get(&id)
            .ok_or_else(|| LinkError::not_found("post", id))
    }

    fn post_mut(&mut self, id: PostId) -> Result<&mut Post> {
        self.posts
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("post", id))
    }

    fn community_slug_of(&self, post: PostId) -> Option<String> {
        let community = self.posts.get(&post)?.community?;
        self.communities.get(&community).map(|c| c.slug.clone())
    }

    fn dispatch_to_post_community(&mut self, post: PostId, event: HubEvent) {
        if let Some(slug) = self.community_slug_of(post) {
            self.dispatch(group::community(&slug), event);
        }
    }

    pub fn create_post(&mut self, author: UserId, new: NewPost) -> Result<PostId> {
        self.ensure_user(author)?;
        let title = validate_title(&new.title)?;
        let content = non_empty(&new.content, "content")?;

        let topics: Vec<String> = new
            .topics
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        match (new.visibility.is_personal(), new.community) {
            (true, Some(_)) => {
                return Err(LinkError::invalid("personal posts cannot belong to a community"))
            }
            (false, None) => {
                return Err(LinkError::invalid("community posts must name a community"))
            }
            (false, Some(community_id)) => {
                let community = self.community(community_id)?;
                if !community.is_member(author) {
                    return Err(LinkError::denied(
                        "you must be a member of the community to post there",
                    ));
                }
                if let Some(unknown) = topics.iter().find(|t| !community.has_topic(t)) {
                    return Err(LinkError::invalid(format!(
                        "'{}' is not a topic of this community",
                        unknown
                    )));
                }
            }
            (true, None) => {}
        }

        let id = self.next_id();
        let now = Utc::now();
        self.posts.insert(
            id,
            Post {
                id,
                author,
                community: new.community,
                title,
                content,
                visibility: new.visibility,
                topics,
                is_pinned: false,
                is_edited: false,
                edited_at: None,
                view_count: 0,
                rating: 0.0,
                total_ratings: 0,
                ratings: Default::default(),
                comment_count: 0,
                created_at: now,
                updated_at: now,
            },
        );

        self.user_mut(author)?.post_count += 1;
        if let Some(community_id) = new.community {
            let community = self.community_mut(community_id)?;
            if let Some(member) = community.member_mut(author) {
                member.contributions += 1;
                member.last_active = now;
            }
        }
        info!(post_id = %id, author_id = %author, "post created");
        Ok(id)
    }

    pub fn edit_post(
        &mut self,
        actor: UserId,
        id: PostId,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<()> {
        if self.post(id)?.author != actor {
            return Err(LinkError::denied("only the author can edit a post"));
        }
        let title = title.map(validate_title).transpose()?;
        let content = content.map(|c| non_empty(c, "content")).transpose()?;

        let now = Utc::now();
        let post = self.post_mut(id)?;
        if let Some(title) = title {
            post.title = title;
        }
        if let Some(content) = content {
            if content != post.content {
                post.content = content;
                post.is_edited = true;
                post.edited_at = Some(now);
            }
        }
        post.updated_at = now;
        Ok(())
    }

    fn can_moderate_post(&self, post: &Post, actor: UserId) -> bool {
        post.community
            .and_then(|c| self.communities.get(&c))
            .is_some_and(|c| c.can_moderate(actor))
    }

    /// Removes the post with its discussion and saves
    pub fn delete_post(&mut self, actor: UserId, id: PostId) -> Result<()> {
        let post = self.post(id)?;
        if post.author != actor && !self.can_moderate_post(post, actor) {
            return Err(LinkError::denied("not allowed to delete this post"));
        }
        let author = post.author;

        let comment_ids: BTreeSet<CommentId> = self
            .comments
            .values()
            .filter(|c| c.post == id)
            .map(|c| c.id)
            .collect();
        self.replies.retain(|_, r| !comment_ids.contains(&r.comment));
        self.comments.retain(|_, c| c.post != id);
        self.saved_posts.retain(|s| s.post != id);
        self.posts.remove(&id);

        if let Ok(user) = self.user_mut(author) {
            user.post_count = user.post_count.saturating_sub(1);
        }
        info!(post_id = %id, "post deleted");
        Ok(())
    }

    pub fn pin_post(&mut self, actor: UserId, id: PostId, pinned: bool) -> Result<()> {
        let post = self.post(id)?;
        if post.community.is_none() {
            return Err(LinkError::invalid("only community posts can be pinned"));
        }
        if !self.can_moderate_post(post, actor) {
            return Err(LinkError::denied("requires community admin or moderator"));
        }
        self.post_mut(id)?.is_pinned = pinned;
        Ok(())
    }

    /// Visibility rules for a post and `viewer`
    pub fn can_view_post(&self, viewer: UserId, id: PostId) -> Result<bool> {
        let post = self.post(id)?;
        Ok(self.post_visible_to(post, viewer))
    }

    fn post_visible_to(&self, post: &Post, viewer: UserId) -> bool {
        if post.author == viewer {
            return true;
        }
        match post.visibility {
            PostVisibility::PersonalPrivate => false,
            PostVisibility::PersonalConnections => self.are_connected(post.author, viewer),
            PostVisibility::PersonalPublic => true,
            PostVisibility::Community => post
                .community
                .and_then(|c| self.communities.get(&c))
                .is_some_and(|c| !c.is_private || c.is_member(viewer)),
        }
    }

    fn ensure_post_visible(&self, viewer: UserId, id: PostId) -> Result<()> {
        if self.can_view_post(viewer, id)? {
            Ok(())
        } else {
            Err(LinkError::denied("post is not visible to you"))
        }
    }

    /// Visible posts, pinned first then newest first
    pub fn feed(&self, viewer: UserId, community: Option<CommunityId>) -> Result<Vec<&Post>> {
        if let Some(id) = community {
            self.community(id)?;
        }
        let mut posts: Vec<&Post> = self
            .posts
            .values()
            .filter(|p| community.is_none() || p.community == community)
            .filter(|p| self.post_visible_to(p, viewer))
            .collect();
        posts.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(posts)
    }

    pub fn record_post_view(&mut self, viewer: UserId, id: PostId) -> Result<u32> {
        self.ensure_post_visible(viewer, id)?;
        let post = self.post_mut(id)?;
        post.view_count += 1;
        Ok(post.view_count)
    }

    pub fn comment(&self, id: CommentId) -> Result<&Comment> {
        self.comments
            .get(&id)
            .ok_or_else(|| LinkError::not_found("comment", id))
    }

    pub fn reply(&self, id: ReplyId) -> Result<&Reply> {
        self.replies
            .get(&id)
            .ok_or_else(|| LinkError::not_found("reply", id))
    }

    /// Comments oldest first
    pub fn comments_for(&self, post: PostId) -> Vec<&Comment> {
        self.comments.values().filter(|c| c.post == post).collect()
    }

    pub fn replies_for(&self, comment: CommentId) -> Vec<&Reply> {
        self.replies
            .values()
            .filter(|r| r.comment == comment)
            .collect()
    }

    pub fn add_comment(&mut self, author: UserId, post_id: PostId, content: &str) -> Result<CommentId> {
        self.ensure_user(author)?;
        self.ensure_post_visible(author, post_id)?;
        let content = non_empty(content, "comment")?;

        let id = self.next_id();
        let now = Utc::now();
        self.comments.insert(
            id,
            Comment {
                id,
                post: post_id,
                author,
                content: content.clone(),
                is_top_comment: false,
                rating: 0.0,
                total_ratings: 0,
                ratings: Default::default(),
                created_at: now,
                updated_at: now,
            },
        );
        let post = self.post_mut(post_id)?;
        post.comment_count += 1;
        let (post_author, title) = (post.author, post.title.clone());

        self.dispatch_to_post_community(
            post_id,
            HubEvent::CommentUpdate {
                action: "created".to_string(),
                post_id,
                comment_id: Some(id),
                content: Some(content),
            },
        );
        if post_author != author {
            let commenter = self.user(author)?.username.clone();
            self.notify(
                NewNotification::new(
                    post_author,
                    NotificationType::Comment,
                    "New comment",
                    format!("{} commented on \"{}\"", commenter, title),
                )
                .sender(author)
                .data(json!({ "post_id": post_id, "comment_id": id })),
            )?;
        }
        debug!(comment_id = %id, post_id = %post_id, "comment added");
        Ok(id)
    }

    pub fn delete_comment(&mut self, actor: UserId, id: CommentId) -> Result<()> {
        let comment = self.comment(id)?;
        let post_id = comment.post;
        let post = self.post(post_id)?;
        if comment.author != actor && post.author != actor && !self.can_moderate_post(post, actor) {
            return Err(LinkError::denied("not allowed to delete this comment"));
        }

        self.comments.remove(&id);
        self.replies.retain(|_, r| r.comment != id);
        let post = self.post_mut(post_id)?;
        post.comment_count = post.comment_count.saturating_sub(1);
        self.dispatch_to_post_community(
            post_id,
            HubEvent::CommentUpdate {
                action: "deleted".to_string(),
                post_id,
                comment_id: Some(id),
                content: None,
            },
        );
        Ok(())
    }

    /// Mark one comment as the post's highlighted answer
    pub fn set_top_comment(&mut self, actor: UserId, id: CommentId) -> Result<()> {
        let post_id = self.comment(id)?.post;
        let post = self.post(post_id)?;
        if post.author != actor && !self.can_moderate_post(post, actor) {
            return Err(LinkError::denied("not allowed to highlight comments on this post"));
        }
        for comment in self.comments.values_mut().filter(|c| c.post == post_id) {
            comment.is_top_comment = comment.id == id;
        }
        Ok(())
    }

    pub fn add_reply(
        &mut self,
        author: UserId,
        comment_id: CommentId,
        parent_reply: Option<ReplyId>,
        content: &str,
    ) -> Result<ReplyId> {
        self.ensure_user(author)?;
        let post_id = self.comment(comment_id)?.post;
        self.ensure_post_visible(author, post_id)?;
        if let Some(parent) = parent_reply {
            if self.reply(parent)?.comment != comment_id {
                return Err(LinkError::invalid("parent reply belongs to another comment"));
            }
        }
        let content = non_empty(content, "reply")?;

        let id = self.next_id();
        self.replies.insert(
            id,
            Reply {
                id,
                comment: comment_id,
                parent_reply,
                author,
                content: content.clone(),
                rating: 0.0,
                total_ratings: 0,
                ratings: Default::default(),
                created_at: Utc::now(),
            },
        );
        self.dispatch_to_post_community(
            post_id,
            HubEvent::CommentUpdate {
                action: "reply_created".to_string(),
                post_id,
                comment_id: Some(comment_id),
                content: Some(content),
            },
        );
        Ok(id)
    }

    /// Deletes the reply and every reply nested under it
    pub fn delete_reply(&mut self, actor: UserId, id: ReplyId) -> Result<usize> {
        let reply = self.reply(id)?;
        let comment_id = reply.comment;
        let post_id = self.comment(comment_id)?.post;
        if reply.author != actor && !self.can_moderate_post(self.post(post_id)?, actor) {
            return Err(LinkError::denied("not allowed to delete this reply"));
        }

        let mut doomed = BTreeSet::from([id]);
        loop {
            let before = doomed.len();
            let children: Vec<ReplyId> = self
                .replies
                .values()
                .filter(|r| r.parent_reply.is_some_and(|p| doomed.contains(&p)))
                .map(|r| r.id)
                .collect();
            doomed.extend(children);
            if doomed.len() == before {
                break;
            }
        }
        self.replies.retain(|reply_id, _| !doomed.contains(reply_id));

        self.dispatch_to_post_community(
            post_id,
            HubEvent::ReplyDeleted {
                post_id,
                comment_id,
                reply_id: id,
            },
        );
        Ok(doomed.len())
    }

    fn publish_rating(
        &mut self,
        post_id: PostId,
        comment_id: Option<CommentId>,
        reply_id: Option<ReplyId>,
        rating: f64,
        total_ratings: u32,
    ) {
        self.dispatch_to_post_community(
            post_id,
            HubEvent::RatingUpdate {
                post_id,
                comment_id,
                reply_id,
                rating,
                total_ratings,
            },
        );
    }

    /// Upsert the user's rating and return the new average
    pub fn rate_post(&mut self, user: UserId, id: PostId, value: u8) -> Result<f64> {
        self.ensure_user(user)?;
        self.ensure_post_visible(user, id)?;
        let post = self.post_mut(id)?;
        post.ratings.rate(user, value)?;
        post.rating = post.ratings.average();
        post.total_ratings = post.ratings.total();
        let (rating, total) = (post.rating, post.total_ratings);
        self.publish_rating(id, None, None, rating, total);
        Ok(rating)
    }

    pub fn remove_post_rating(&mut self, user: UserId, id: PostId) -> Result<bool> {
        let post = self.post_mut(id)?;
        if !post.ratings.remove(user) {
            return Ok(false);
        }
        post.rating = post.ratings.average();
        post.total_ratings = post.ratings.total();
        let (rating, total) = (post.rating, post.total_ratings);
        self.publish_rating(id, None, None, rating, total);
        Ok(true)
    }

    pub fn rate_comment(&mut self, user: UserId, id: CommentId, value: u8) -> Result<f64> {
        self.ensure_user(user)?;
        let post_id = self.comment(id)?.post;
        self.ensure_post_visible(user, post_id)?;
        let comment = self
            .comments
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("comment", id))?;
        comment.ratings.rate(user, value)?;
        comment.rating = comment.ratings.average();
        comment.total_ratings = comment.ratings.total();
        let (rating, total) = (comment.rating, comment.total_ratings);
        self.publish_rating(post_id, Some(id), None, rating, total);
        Ok(rating)
    }

    pub fn rate_reply(&mut self, user: UserId, id: ReplyId, value: u8) -> Result<f64> {
        self.ensure_user(user)?;
        let comment_id = self.reply(id)?.comment;
        let post_id = self.comment(comment_id)?.post;
        self.ensure_post_visible(user, post_id)?;
        let reply = self
            .replies
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("reply", id))?;
        reply.ratings.rate(user, value)?;
        reply.rating = reply.ratings.average();
        reply.total_ratings = reply.ratings.total();
        let (rating, total) = (reply.rating, reply.total_ratings);
        self.publish_rating(post_id, Some(comment_id), Some(id), rating, total);
        Ok(rating)
    }

    /// `false` when the post was already saved
    pub fn save_post(&mut self, user: UserId, id: PostId) -> Result<bool> {
        self.ensure_user(user)?;
        self.ensure_post_visible(user, id)?;
        if self.saved_posts.iter().any(|s| s.user == user && s.post == id) {
            return Ok(false);
        }
        self.saved_posts.push(SavedPost {
            user,
            post: id,
            saved_at: Utc::now(),
        });
        Ok(true)
    }

    pub fn unsave_post(&mut self, user: UserId, id: PostId) -> bool {
        let before = self.saved_posts.len();
        self.saved_posts.retain(|s| !(s.user == user && s.post == id));
        self.saved_posts.len() != before
    }

    /// Saved posts still visible to the user, most recently saved first
    pub fn saved_posts(&self, user: UserId) -> Vec<&Post> {
        let mut saved: Vec<&SavedPost> = self.saved_posts.iter().filter(|s| s.user == user).collect();
        saved.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        saved
            .into_iter()
            .filter_map(|s| self.posts.get(&s.post))
            .filter(|p| self.post_visible_to(p, user))
            .collect()
    }

    pub fn event(&self, id: EventId) -> Result<&CommunityEvent> {
        self.events
            .get(&id)
            .ok_or_else(|| LinkError::not_found("event", id))
    }

    fn event_mut(&mut self, id: EventId) -> Result<&mut CommunityEvent> {
        self.events
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("event", id))
    }

    pub fn events_for(&self, community: CommunityId) -> Vec<&CommunityEvent> {
        let mut events: Vec<&CommunityEvent> = self
            .events
            .values()
            .filter(|e| e.community == community && e.is_active)
            .collect();
        events.sort_by(|a, b| a.start.cmp(&b.start));
        events
    }

    pub fn create_event(&mut self, actor: UserId, new: NewEvent) -> Result<EventId> {
        self.require_moderator(new.community, actor)?;
        let title = non_empty(&new.title, "event title")?;
        if new.end <= new.start {
            return Err(LinkError::invalid("event must end after it starts"));
        }
        if new.max_participants == Some(0) {
            return Err(LinkError::invalid("max participants must be positive"));
        }

        let id = self.next_id();
        let now = Utc::now();
        let mut event = CommunityEvent {
            id,
            community: new.community,
            title,
            description: new.description.trim().to_string(),
            event_type: new.event_type,
            start: new.start,
            end: new.end,
            created_by: actor,
            max_participants: new.max_participants,
            participants: BTreeSet::new(),
            status: EventStatus::Upcoming,
            is_active: true,
            created_at: now,
        };
        event.status = event.status_at(now);
        self.events.insert(id, event);
        info!(event_id = %id, community_id = %new.community, "event created");
        Ok(id)
    }

    /// Join an upcoming or ongoing event; the status is derived from `now`
    pub fn join_event(&mut self, user: UserId, id: EventId, now: DateTime<Utc>) -> Result<()> {
        let event = self.event(id)?;
        if !self.community(event.community)?.is_member(user) {
            return Err(LinkError::denied("only community members can join events"));
        }
        let status = event.status_at(now);
        if !event.is_active || matches!(status, EventStatus::Cancelled | EventStatus::Completed) {
            return Err(LinkError::InvalidState {
                entity: "event",
                from: format!("{:?}", status).to_lowercase(),
                action: "join",
            });
        }
        if event.participants.contains(&user) {
            return Err(LinkError::conflict("already participating"));
        }
        if event.is_full() {
            return Err(LinkError::invalid("event is full"));
        }
        self.event_mut(id)?.participants.insert(user);
        Ok(())
    }

    pub fn leave_event(&mut self, user: UserId, id: EventId) -> Result<()> {
        if !self.event_mut(id)?.participants.remove(&user) {
            return Err(LinkError::invalid("not participating in this event"));
        }
        Ok(())
    }

    pub fn cancel_event(&mut self, actor: UserId, id: EventId) -> Result<()> {
        let event = self.event(id)?;
        if event.created_by != actor {
            self.require_moderator(event.community, actor)?;
        }
        if event.status == EventStatus::Completed {
            return Err(LinkError::InvalidState {
                entity: "event",
                from: "completed".to_string(),
                action: "cancel",
            });
        }
        self.event_mut(id)?.status = EventStatus::Cancelled;
        info!(event_id = %id, "event cancelled");
        Ok(())
    }

    /// Re-derive statuses from the schedule; returns how many changed
    pub fn refresh_event_statuses(&mut self, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for event in self.events.values_mut() {
            let status = event.status_at(now);
            if status != event.status {
                event.status = status;
                changed += 1;
            }
        }
        if changed > 0 {
            debug!(changed, "event statuses refreshed");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::{CommunityEvent, EventType};
    use crate::realtime::Dispatch;
    use crate::users::NewUser;
    use chrono::Duration;

    fn setup() -> (Store, UserId, UserId, CommunityId) {
        let mut store = Store::default();
        let ada = store.register_user(NewUser::new("ada", "ada@x.io")).unwrap();
        let bob = store.register_user(NewUser::new("bob", "bob@x.io")).unwrap();
        let community = store
            .create_community(ada, NewCommunity::new("Rust Lovers").topics(["async", "wasm"]))
            .unwrap();
        (store, ada, bob, community)
    }

    fn community_events(dispatches: &[Dispatch]) -> Vec<&HubEvent> {
        dispatches
            .iter()
            .filter(|d| d.group == "community_rust-lovers")
            .map(|d| &d.event)
            .collect()
    }

    #[test]
    fn test_create_community_slug_and_admin() {
        let (mut store, ada, bob, id) = setup();
        let community = store.community(id).unwrap();
        assert_eq!(community.slug, "rust-lovers");
        assert_eq!(community.role_of(ada), Some(CommunityRole::Admin));
        assert_eq!(community.members_count, 1);
        assert_eq!(community.topics.len(), 2);

        let second = store
            .create_community(bob, NewCommunity::new("Rust  Lovers"))
            .unwrap();
        let third = store
            .create_community(bob, NewCommunity::new("rust lovers!"))
            .unwrap();
        assert_eq!(store.community(second).unwrap().slug, "rust-lovers-2");
        assert_eq!(store.community(third).unwrap().slug, "rust-lovers-3");
        assert!(store.create_community(bob, NewCommunity::new("  ")).is_err());
        assert_eq!(store.community_by_slug("rust-lovers-2").unwrap().id, second);
    }

    #[test]
    fn test_public_join_and_conflict() {
        let (mut store, _ada, bob, id) = setup();
        assert_eq!(store.join_community(bob, id, "").unwrap(), JoinOutcome::Joined);
        assert_eq!(store.community(id).unwrap().members_count, 2);
        assert!(matches!(
            store.join_community(bob, id, ""),
            Err(LinkError::Conflict(_))
        ));
    }

    #[test]
    fn test_private_join_request_flow() {
        let (mut store, ada, bob, _) = setup();
        let private = store
            .create_community(ada, NewCommunity::new("Secret").private())
            .unwrap();
        let outcome = store.join_community(bob, private, "let me in").unwrap();
        let JoinOutcome::Requested(request) = outcome else {
            panic!("expected a join request");
        };
        assert!(!store.community(private).unwrap().is_member(bob));
        assert!(store
            .notifications_for(ada, true, None)
            .iter()
            .any(|n| n.notification_type == NotificationType::CommunityJoin));

        assert!(store.resolve_join_request(bob, request, true).is_err());
        store.resolve_join_request(ada, request, true).unwrap();
        assert!(store.community(private).unwrap().is_member(bob));
        assert!(store
            .notifications_for(bob, true, None)
            .iter()
            .any(|n| n.notification_type == NotificationType::CommunityJoinAccepted));
        assert!(matches!(
            store.resolve_join_request(ada, request, false),
            Err(LinkError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_last_admin_cannot_leave() {
        let (mut store, ada, bob, id) = setup();
        store.join_community(bob, id, "").unwrap();
        assert!(matches!(
            store.leave_community(ada, id),
            Err(LinkError::InvalidState { .. })
        ));

        store
            .set_community_role(ada, id, bob, CommunityRole::Admin)
            .unwrap();
        store.leave_community(ada, id).unwrap();
        assert_eq!(store.community(id).unwrap().members_count, 1);
        assert!(store
            .notifications_for(bob, false, None)
            .iter()
            .any(|n| n.notification_type == NotificationType::CommunityRoleChange));
    }

    #[test]
    fn test_last_admin_cannot_be_demoted() {
        let (mut store, ada, bob, id) = setup();
        store.join_community(bob, id, "").unwrap();

        assert!(matches!(
            store.set_community_role(ada, id, ada, CommunityRole::Member),
            Err(LinkError::InvalidState { action: "demote", .. })
        ));
        assert_eq!(store.community(id).unwrap().role_of(ada), Some(CommunityRole::Admin));

        store
            .set_community_role(ada, id, bob, CommunityRole::Admin)
            .unwrap();
        store
            .set_community_role(bob, id, ada, CommunityRole::Moderator)
            .unwrap();
        assert!(matches!(
            store.set_community_role(bob, id, bob, CommunityRole::Member),
            Err(LinkError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_topic_removal_detaches_posts() {
        let (mut store, ada, _bob, id) = setup();
        let post = store
            .create_post(
                ada,
                NewPost::in_community(id, "Tokio tips", "spawn less").topics(["async", "wasm"]),
            )
            .unwrap();
        store
            .update_community(
                ada,
                id,
                CommunityUpdate {
                    topics: Some(vec!["wasm".to_string()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(store.post(post).unwrap().topics, vec!["wasm".to_string()]);
    }

    #[test]
    fn test_post_rules() {
        let (mut store, ada, bob, id) = setup();
        assert!(store
            .create_post(bob, NewPost::in_community(id, "Hi", "body"))
            .is_err());
        let mut personal = NewPost::personal("Mine", "body", PostVisibility::PersonalPublic);
        personal.community = Some(id);
        assert!(store.create_post(ada, personal).is_err());
        assert!(store
            .create_post(ada, NewPost::in_community(id, "Hi", "body").topics(["cooking"]))
            .is_err());
        let long_title = "x".repeat(201);
        assert!(store
            .create_post(
                ada,
                NewPost::personal(long_title, "body", PostVisibility::PersonalPublic)
            )
            .is_err());
        store
            .create_post(ada, NewPost::in_community(id, "Hi", "body"))
            .unwrap();
        assert_eq!(store.user(ada).unwrap().post_count, 1);
    }

    #[test]
    fn test_visibility_rules() {
        let (mut store, ada, bob, _) = setup();
        let private = store
            .create_post(ada, NewPost::personal("p", "c", PostVisibility::PersonalPrivate))
            .unwrap();
        let friends = store
            .create_post(ada, NewPost::personal("f", "c", PostVisibility::PersonalConnections))
            .unwrap();
        let public = store
            .create_post(ada, NewPost::personal("o", "c", PostVisibility::PersonalPublic))
            .unwrap();

        assert!(!store.can_view_post(bob, private).unwrap());
        assert!(!store.can_view_post(bob, friends).unwrap());
        assert!(store.can_view_post(bob, public).unwrap());
        assert!(store.can_view_post(ada, private).unwrap());

        let request = store.send_connection_request(ada, bob, "").unwrap();
        store.accept_connection_request(bob, request).unwrap();
        assert!(store.can_view_post(bob, friends).unwrap());
    }

    #[test]
    fn test_private_community_posts_hidden_from_outsiders() {
        let (mut store, ada, bob, _) = setup();
        let secret = store
            .create_community(ada, NewCommunity::new("Secret").private())
            .unwrap();
        let post = store
            .create_post(ada, NewPost::in_community(secret, "s", "c"))
            .unwrap();
        assert!(!store.can_view_post(bob, post).unwrap());
        assert!(store.record_post_view(bob, post).is_err());
        assert_eq!(store.record_post_view(ada, post).unwrap(), 1);
    }

    #[test]
    fn test_feed_pinned_first() {
        let (mut store, ada, bob, id) = setup();
        store.join_community(bob, id, "").unwrap();
        let first = store
            .create_post(ada, NewPost::in_community(id, "first", "c"))
            .unwrap();
        let second = store
            .create_post(bob, NewPost::in_community(id, "second", "c"))
            .unwrap();
        assert!(store.pin_post(bob, first, true).is_err());
        store.pin_post(ada, first, true).unwrap();

        let feed: Vec<PostId> = store
            .feed(bob, Some(id))
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(feed, vec![first, second]);
    }

    #[test]
    fn test_edit_post_marks_edited() {
        let (mut store, ada, bob, _) = setup();
        let post = store
            .create_post(ada, NewPost::personal("t", "c", PostVisibility::PersonalPublic))
            .unwrap();
        assert!(store.edit_post(bob, post, None, Some("x")).is_err());
        store.edit_post(ada, post, Some("new title"), None).unwrap();
        assert!(!store.post(post).unwrap().is_edited);
        store.edit_post(ada, post, None, Some("changed")).unwrap();
        let edited = store.post(post).unwrap();
        assert!(edited.is_edited);
        assert!(edited.edited_at.is_some());
    }

    #[test]
    fn test_comments_replies_and_events() {
        let (mut store, ada, bob, id) = setup();
        store.join_community(bob, id, "").unwrap();
        let post = store
            .create_post(ada, NewPost::in_community(id, "Q", "?"))
            .unwrap();
        store.drain_dispatches();

        let comment = store.add_comment(bob, post, "answer").unwrap();
        assert_eq!(store.post(post).unwrap().comment_count, 1);
        let reply = store.add_reply(ada, comment, None, "thanks").unwrap();
        let nested = store.add_reply(bob, comment, Some(reply), "np").unwrap();
        assert!(store.delete_reply(bob, reply).is_err());
        assert_eq!(store.delete_reply(ada, reply).unwrap(), 2);
        assert!(store.reply(nested).is_err());

        let dispatches = store.drain_dispatches();
        let events = community_events(&dispatches);
        assert!(events.iter().any(|e| matches!(
            e,
            HubEvent::CommentUpdate { action, .. } if action == "created"
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, HubEvent::ReplyDeleted { .. })));

        store.delete_comment(ada, comment).unwrap();
        assert_eq!(store.post(post).unwrap().comment_count, 0);
    }

    #[test]
    fn test_ratings_average_and_events() {
        let (mut store, ada, bob, id) = setup();
        store.join_community(bob, id, "").unwrap();
        let post = store
            .create_post(ada, NewPost::in_community(id, "R", "c"))
            .unwrap();
        store.drain_dispatches();

        store.rate_post(ada, post, 5).unwrap();
        assert_eq!(store.rate_post(bob, post, 2).unwrap(), 3.5);
        assert_eq!(store.rate_post(bob, post, 4).unwrap(), 4.5);
        assert_eq!(store.post(post).unwrap().total_ratings, 2);
        assert!(store.rate_post(bob, post, 9).is_err());
        assert!(store.remove_post_rating(bob, post).unwrap());
        assert!(!store.remove_post_rating(bob, post).unwrap());
        assert_eq!(store.post(post).unwrap().rating, 5.0);

        let comment = store.add_comment(bob, post, "c").unwrap();
        assert_eq!(store.rate_comment(ada, comment, 3).unwrap(), 3.0);
        let reply = store.add_reply(ada, comment, None, "r").unwrap();
        assert_eq!(store.rate_reply(bob, reply, 1).unwrap(), 1.0);

        let dispatches = store.drain_dispatches();
        let ratings = community_events(&dispatches)
            .into_iter()
            .filter(|e| matches!(e, HubEvent::RatingUpdate { .. }))
            .count();
        assert_eq!(ratings, 6);
    }

    #[test]
    fn test_save_and_delete_post() {
        let (mut store, ada, bob, _) = setup();
        let post = store
            .create_post(ada, NewPost::personal("t", "c", PostVisibility::PersonalPublic))
            .unwrap();
        assert!(store.save_post(bob, post).unwrap());
        assert!(!store.save_post(bob, post).unwrap());
        assert_eq!(store.saved_posts(bob).len(), 1);

        assert!(store.delete_post(bob, post).is_err());
        store.delete_post(ada, post).unwrap();
        assert!(store.saved_posts(bob).is_empty());
        assert!(!store.unsave_post(bob, post));
        assert_eq!(store.user(ada).unwrap().post_count, 0);
    }

    fn new_event(community: CommunityId, start: DateTime<Utc>) -> NewEvent {
        NewEvent {
            community,
            title: "AMA".to_string(),
            description: String::new(),
            event_type: EventType::Ama,
            start,
            end: start + Duration::hours(2),
            max_participants: Some(1),
        }
    }

    #[test]
    fn test_event_lifecycle() {
        let (mut store, ada, bob, id) = setup();
        let start = Utc::now() + Duration::days(1);
        assert!(store.create_event(bob, new_event(id, start)).is_err());
        let mut bad = new_event(id, start);
        bad.end = start;
        assert!(store.create_event(ada, bad).is_err());

        let event = store.create_event(ada, new_event(id, start)).unwrap();
        let now = Utc::now();
        assert!(store.join_event(bob, event, now).is_err());
        store.join_community(bob, id, "").unwrap();
        store.join_event(bob, event, now).unwrap();
        assert!(store.join_event(ada, event, now).is_err());

        assert_eq!(store.refresh_event_statuses(start + Duration::hours(1)), 1);
        assert_eq!(store.event(event).unwrap().status, EventStatus::Ongoing);

        store.cancel_event(ada, event).unwrap();
        assert_eq!(store.refresh_event_statuses(start + Duration::hours(3)), 0);
        let cancelled: &CommunityEvent = store.event(event).unwrap();
        assert_eq!(cancelled.status, EventStatus::Cancelled);
        store.leave_event(bob, event).unwrap();
        assert!(store.leave_event(bob, event).is_err());
    }

    #[test]
    fn test_finished_event_cannot_be_joined_before_refresh() {
        let (mut store, ada, bob, id) = setup();
        store.join_community(bob, id, "").unwrap();
        let start = Utc::now() + Duration::days(1);
        let mut open = new_event(id, start);
        open.max_participants = None;
        let event = store.create_event(ada, open).unwrap();
        assert_eq!(store.event(event).unwrap().status, EventStatus::Upcoming);

        let after = start + Duration::hours(3);
        assert!(matches!(
            store.join_event(bob, event, after),
            Err(LinkError::InvalidState { action: "join", .. })
        ));
        store.join_event(bob, event, start + Duration::hours(1)).unwrap();
    }

    #[test]
    fn test_activity_score() {
        let (mut store, ada, bob, id) = setup();
        store.join_community(bob, id, "").unwrap();
        store
            .create_post(ada, NewPost::in_community(id, "t", "c"))
            .unwrap();
        assert_eq!(store.refresh_activity_score(id, Utc::now()).unwrap(), 50);
        assert_eq!(store.adjust_community_online(id, true).unwrap(), 1);
        assert_eq!(store.adjust_community_online(id, false).unwrap(), 0);
        assert_eq!(store.adjust_community_online(id, false).unwrap(), 0);
    }
}
