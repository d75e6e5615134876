use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{NotificationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ConnectionRequest,
    ConnectionAccepted,
    ConnectionRejected,
    ConnectionCreated,
    CommunityInvite,
    CommunityJoin,
    CommunityJoinAccepted,
    CommunityJoinRejected,
    CommunityRoleChange,
    Message,
    Achievement,
    Event,
    Mention,
    Like,
    Comment,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ConnectionRequest => "connection_request",
            NotificationType::ConnectionAccepted => "connection_accepted",
            NotificationType::ConnectionRejected => "connection_rejected",
            NotificationType::ConnectionCreated => "connection_created",
            NotificationType::CommunityInvite => "community_invite",
            NotificationType::CommunityJoin => "community_join",
            NotificationType::CommunityJoinAccepted => "community_join_accepted",
            NotificationType::CommunityJoinRejected => "community_join_rejected",
            NotificationType::CommunityRoleChange => "community_role_change",
            NotificationType::Message => "message",
            NotificationType::Achievement => "achievement",
            NotificationType::Event => "event",
            NotificationType::Mention => "mention",
            NotificationType::Like => "like",
            NotificationType::Comment => "comment",
        }
    }

    /// Preference category gating this type; `None` is always delivered
    pub fn preference_category(&self) -> Option<&'static str> {
        match self {
            NotificationType::ConnectionRequest => Some("connection_requests"),
            NotificationType::CommunityInvite => Some("community_invites"),
            NotificationType::Message => Some("messages"),
            NotificationType::Achievement => Some("achievements"),
            NotificationType::Event => Some("events"),
            NotificationType::CommunityJoin => Some("community_join"),
            NotificationType::CommunityJoinAccepted => Some("community_join_accepted"),
            NotificationType::CommunityJoinRejected => Some("community_join_rejected"),
            NotificationType::CommunityRoleChange => Some("community_role_change"),
            _ => None,
        }
    }
}

/// Every category a user can toggle per channel
pub const PREFERENCE_CATEGORIES: [&str; 9] = [
    "connection_requests",
    "community_invites",
    "messages",
    "achievements",
    "events",
    "community_join",
    "community_join_accepted",
    "community_join_rejected",
    "community_role_change",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Push,
    InApp,
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "push" => Ok(Channel::Push),
            "in_app" | "in-app" => Ok(Channel::InApp),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub sender: Option<UserId>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Channel toggles keyed by category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email: BTreeMap<String, bool>,
    pub push: BTreeMap<String, bool>,
    pub in_app: BTreeMap<String, bool>,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        let all_on = || {
            PREFERENCE_CATEGORIES
                .iter()
                .map(|c| (c.to_string(), true))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            email: all_on(),
            push: all_on(),
            in_app: all_on(),
        }
    }
}

impl NotificationPreferences {
    fn channel(&self, channel: Channel) -> &BTreeMap<String, bool> {
        match channel {
            Channel::Email => &self.email,
            Channel::Push => &self.push,
            Channel::InApp => &self.in_app,
        }
    }

    pub(crate) fn channel_mut(&mut self, channel: Channel) -> &mut BTreeMap<String, bool> {
        match channel {
            Channel::Email => &mut self.email,
            Channel::Push => &mut self.push,
            Channel::InApp => &mut self.in_app,
        }
    }

    /// Unknown categories default to enabled
    pub fn is_enabled(&self, channel: Channel, kind: NotificationType) -> bool {
        match kind.preference_category() {
            Some(category) => self
                .channel(channel)
                .get(category)
                .copied()
                .unwrap_or(true),
            None => true,
        }
    }
}

/// Notification to be stored and delivered
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient: UserId,
    pub sender: Option<UserId>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

impl NewNotification {
    pub fn new(
        recipient: UserId,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient,
            sender: None,
            notification_type,
            title: title.into(),
            message: message.into(),
            data: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn sender(mut self, sender: UserId) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_serializes_snake_case() {
        let json = serde_json::to_string(&NotificationType::CommunityJoinAccepted).unwrap();
        assert_eq!(json, "\"community_join_accepted\"");
        assert_eq!(
            NotificationType::CommunityJoinAccepted.as_str(),
            "community_join_accepted"
        );
    }

    #[test]
    fn test_uncategorized_types_always_enabled() {
        let mut prefs = NotificationPreferences::default();
        for value in prefs.in_app.values_mut() {
            *value = false;
        }
        assert!(prefs.is_enabled(Channel::InApp, NotificationType::Like));
        assert!(!prefs.is_enabled(Channel::InApp, NotificationType::Message));
        assert!(prefs.is_enabled(Channel::Email, NotificationType::Message));
    }
}
