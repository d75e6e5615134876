//! Account, profile, follow and block operations

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::model::{
    Block, Endorsement, Follow, NewUser, OnlineStatus, ProfileUpdate, Skill, User,
};
use crate::errors::{LinkError, Result};
use crate::realtime::{group, HubEvent};
use crate::connections::RequestStatus;
use crate::store::Store;
use crate::types::{shift_minutes, SkillId, UserId};

const MAX_USERNAME_LEN: usize = 150;

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(LinkError::invalid("username is required"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(LinkError::invalid(format!(
            "username longer than {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(LinkError::invalid(
            "username may only contain letters, digits and _ . -",
        ));
    }
    Ok(())
}

fn normalized(tag: &str) -> Result<String> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(LinkError::invalid("value cannot be empty"));
    }
    Ok(tag.to_string())
}

impl Store {
    pub fn register_user(&mut self, new: NewUser) -> Result<UserId> {
        let username = new.username.trim();
        validate_username(username)?;

        if self.find_by_username(username).is_some() {
            return Err(LinkError::conflict(format!(
                "username '{}' is taken",
                username
            )));
        }

        let email = new.email.trim();
        if !email.is_empty()
            && self
                .users
                .values()
                .any(|u| u.email.eq_ignore_ascii_case(email))
        {
            return Err(LinkError::conflict(format!("email '{}' is taken", email)));
        }

        let id = self.next_id();
        let user = User::new(id, new, Utc::now());
        info!(user_id = %id, username = %user.username, "user registered");
        self.users.insert(id, user);
        Ok(id)
    }

    pub fn update_profile(&mut self, id: UserId, update: ProfileUpdate) -> Result<()> {
        let user = self.user_mut(id)?;

        if let Some(v) = update.first_name {
            user.first_name = v;
        }
        if let Some(v) = update.last_name {
            user.last_name = v;
        }
        if let Some(v) = update.bio {
            user.bio = v;
        }
        if let Some(v) = update.avatar {
            user.avatar = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = update.cover_photo {
            user.cover_photo = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = update.personal_story {
            user.personal_story = v;
        }
        if let Some(v) = update.location {
            user.location = v;
        }
        if let Some(v) = update.website {
            user.website = v;
        }
        if let Some(v) = update.phone_number {
            user.phone_number = v;
        }
        if let Some(v) = update.date_of_birth {
            user.date_of_birth = Some(v);
        }
        if let Some(v) = update.gender {
            user.gender = v;
        }
        if let Some(v) = update.goals {
            user.goals = v;
        }
        if let Some(v) = update.account_type {
            user.account_type = v;
        }
        if let Some(v) = update.profile_visibility {
            user.profile_visibility = v;
        }
        if let Some(v) = update.is_mentor {
            user.is_mentor = v;
        }
        if let Some(v) = update.education {
            user.education = v;
        }
        if let Some(v) = update.work_experience {
            user.work_experience = v;
        }

        user.profile_completion = user.compute_completion();
        debug!(user_id = %id, completion = user.profile_completion, "profile updated");
        Ok(())
    }

    /// Returns false when the interest was already present
    pub fn add_interest(&mut self, id: UserId, interest: &str) -> Result<bool> {
        let interest = normalized(interest)?;
        Ok(self.user_mut(id)?.interests.insert(interest))
    }

    pub fn remove_interest(&mut self, id: UserId, interest: &str) -> Result<bool> {
        let user = self.user_mut(id)?;
        Ok(user.interests.remove(interest.trim()))
    }

    pub fn add_personality_tag(&mut self, id: UserId, tag: &str) -> Result<bool> {
        let tag = normalized(tag)?;
        Ok(self.user_mut(id)?.personality_tags.insert(tag))
    }

    pub fn add_skill(&mut self, id: UserId, name: &str, level: u8) -> Result<SkillId> {
        let name = normalized(name)?;
        if level > 100 {
            return Err(LinkError::invalid("skill level must be between 0 and 100"));
        }
        self.ensure_user(id)?;

        let skill_id = self.next_id();
        self.user_mut(id)?.skills.push(Skill {
            id: skill_id,
            name,
            level,
        });
        Ok(skill_id)
    }

    pub fn endorse_skill(
        &mut self,
        endorser: UserId,
        user: UserId,
        skill_id: SkillId,
        comment: &str,
    ) -> Result<()> {
        if endorser == user {
            return Err(LinkError::invalid("cannot endorse your own skill"));
        }
        self.ensure_user(endorser)?;
        if self.user(user)?.skill(skill_id).is_none() {
            return Err(LinkError::not_found("skill", skill_id));
        }
        if self
            .endorsements
            .iter()
            .any(|e| e.user == user && e.endorser == endorser && e.skill_id == skill_id)
        {
            return Err(LinkError::conflict("skill already endorsed"));
        }

        self.endorsements.push(Endorsement {
            user,
            endorser,
            skill_id,
            comment: comment.trim().to_string(),
            created_at: Utc::now(),
        });
        self.user_mut(user)?.endorsement_count += 1;
        Ok(())
    }

    pub fn endorsements_for(&self, user: UserId) -> Vec<&Endorsement> {
        self.endorsements.iter().filter(|e| e.user == user).collect()
    }

    pub fn follow(&mut self, follower: UserId, followee: UserId) -> Result<()> {
        if follower == followee {
            return Err(LinkError::invalid("cannot follow yourself"));
        }
        self.ensure_user(follower)?;
        self.ensure_user(followee)?;
        if self.is_blocked_between(follower, followee) {
            return Err(LinkError::Blocked);
        }
        if self.is_following(follower, followee) {
            return Err(LinkError::conflict("already following"));
        }

        self.follows.push(Follow {
            follower,
            followee,
            created_at: Utc::now(),
        });
        self.user_mut(follower)?.following_count += 1;
        self.user_mut(followee)?.follower_count += 1;
        Ok(())
    }

    pub fn unfollow(&mut self, follower: UserId, followee: UserId) -> Result<()> {
        let before = self.follows.len();
        self.follows
            .retain(|f| !(f.follower == follower && f.followee == followee));
        if self.follows.len() == before {
            return Err(LinkError::not_found(
                "follow",
                format!("{}->{}", follower, followee),
            ));
        }

        let user = self.user_mut(follower)?;
        user.following_count = user.following_count.saturating_sub(1);
        let user = self.user_mut(followee)?;
        user.follower_count = user.follower_count.saturating_sub(1);
        Ok(())
    }

    pub fn is_following(&self, follower: UserId, followee: UserId) -> bool {
        self.follows
            .iter()
            .any(|f| f.follower == follower && f.followee == followee)
    }

    /// Blocking severs follows both ways and deactivates any connection
    pub fn block(&mut self, blocker: UserId, blocked: UserId, reason: &str) -> Result<()> {
        if blocker == blocked {
            return Err(LinkError::invalid("cannot block yourself"));
        }
        self.ensure_user(blocker)?;
        self.ensure_user(blocked)?;
        if self
            .blocks
            .iter()
            .any(|b| b.blocker == blocker && b.blocked == blocked)
        {
            return Err(LinkError::conflict("user already blocked"));
        }

        for (from, to) in [(blocker, blocked), (blocked, blocker)] {
            if self.is_following(from, to) {
                self.unfollow(from, to)?;
            }
        }

        let now = Utc::now();
        for conn in self.connections.values_mut() {
            if conn.is_active && conn.is_between(blocker, blocked) {
                conn.is_active = false;
                conn.updated_at = now;
            }
        }
        for request in self.requests.values_mut() {
            if request.status == RequestStatus::Pending
                && request.involves(blocker)
                && request.involves(blocked)
            {
                request.status = RequestStatus::Canceled;
                request.updated_at = now;
            }
        }

        self.blocks.push(Block {
            blocker,
            blocked,
            reason: reason.trim().to_string(),
            created_at: now,
        });
        info!(blocker = %blocker, blocked = %blocked, "user blocked");
        Ok(())
    }

    pub fn unblock(&mut self, blocker: UserId, blocked: UserId) -> Result<()> {
        let before = self.blocks.len();
        self.blocks
            .retain(|b| !(b.blocker == blocker && b.blocked == blocked));
        if self.blocks.len() == before {
            return Err(LinkError::not_found(
                "block",
                format!("{}->{}", blocker, blocked),
            ));
        }
        Ok(())
    }

    pub fn is_blocked_between(&self, a: UserId, b: UserId) -> bool {
        self.blocks.iter().any(|block| {
            (block.blocker == a && block.blocked == b) || (block.blocker == b && block.blocked == a)
        })
    }

    /// Record activity; an offline user comes back online
    pub fn touch_activity(&mut self, id: UserId, now: DateTime<Utc>) -> Result<()> {
        let user = self.user_mut(id)?;
        user.last_active = Some(now);
        if user.online_status != OnlineStatus::Online {
            self.set_online_status(id, OnlineStatus::Online)?;
        }
        Ok(())
    }

    pub fn set_online_status(&mut self, id: UserId, status: OnlineStatus) -> Result<()> {
        let user = self.user_mut(id)?;
        if user.online_status == status {
            return Ok(());
        }
        user.online_status = status;
        self.dispatch(
            group::PRESENCE,
            HubEvent::PresenceUpdate {
                user_id: id,
                status: status.as_str().to_string(),
            },
        );
        Ok(())
    }

    /// Mark users offline whose last activity is older than `stale_minutes`.
    /// Returns the affected usernames; nothing changes on a dry run.
    pub fn cleanup_online_status(
        &mut self,
        stale_minutes: i64,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        if stale_minutes < 0 {
            return Err(LinkError::invalid("stale minutes must not be negative"));
        }
        let threshold = shift_minutes(now, -stale_minutes)?;
        let stale: Vec<(UserId, String)> = self
            .users
            .values()
            .filter(|u| u.online_status == OnlineStatus::Online)
            .filter(|u| u.last_active.map_or(true, |at| at < threshold))
            .map(|u| (u.id, u.username.clone()))
            .collect();

        if dry_run {
            info!(count = stale.len(), "dry run: stale online users found");
            return Ok(stale.into_iter().map(|(_, name)| name).collect());
        }

        for (id, _) in &stale {
            if let Some(user) = self.users.get_mut(id) {
                user.last_active = Some(now);
            }
            // user ids come from the table above
            let _ = self.set_online_status(*id, OnlineStatus::Offline);
        }
        info!(count = stale.len(), "stale online users set offline");
        Ok(stale.into_iter().map(|(_, name)| name).collect())
    }

    pub fn find_by_username(&self, username: &str) -> Option<&User> {
        let username = username.trim();
        self.users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
    }

    /// Case-insensitive match on username, names and interests
    pub fn search_users(&self, query: &str) -> Vec<&User> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.users
            .values()
            .filter(|u| {
                u.username.to_lowercase().contains(&query)
                    || u.first_name.to_lowercase().contains(&query)
                    || u.last_name.to_lowercase().contains(&query)
                    || u.interests.iter().any(|i| i.to_lowercase().contains(&query))
            })
            .collect()
    }
}
