use chrono::Utc;
use tracing::{debug, warn};

use super::model::{
    Channel, NewNotification, Notification, NotificationPreferences, PREFERENCE_CATEGORIES,
};
use crate::errors::{LinkError, Result};
use crate::realtime::{group, HubEvent};
use crate::store::Store;
use crate::types::{NotificationId, UserId};

impl Store {
    /// Store a notification and push it to the recipient when in-app
    /// delivery is enabled for its category
    pub fn notify(&mut self, new: NewNotification) -> Result<NotificationId> {
        self.ensure_user(new.recipient)?;

        let id = self.next_id();
        let now = Utc::now();
        let notification = Notification {
            id,
            recipient: new.recipient,
            sender: new.sender,
            notification_type: new.notification_type,
            title: new.title,
            message: new.message,
            is_read: false,
            created_at: now,
            updated_at: now,
            data: new.data,
        };

        let deliver = self
            .preferences(notification.recipient)
            .is_enabled(Channel::InApp, notification.notification_type);

        if deliver {
            match serde_json::to_value(&notification) {
                Ok(data) => self.dispatch(
                    group::notifications(notification.recipient),
                    HubEvent::NotificationMessage { data },
                ),
                Err(e) => warn!(notification_id = %id, error = %e, "failed to serialize notification"),
            }
        } else {
            debug!(
                notification_id = %id,
                kind = notification.notification_type.as_str(),
                "in-app delivery disabled by preference"
            );
        }

        self.notifications.insert(id, notification);
        Ok(id)
    }

    pub fn notification(&self, id: NotificationId) -> Result<&Notification> {
        self.notifications
            .get(&id)
            .ok_or_else(|| LinkError::not_found("notification", id))
    }

    /// Newest first
    pub fn notifications_for(
        &self,
        user: UserId,
        unread_only: bool,
        limit: Option<usize>,
    ) -> Vec<&Notification> {
        let mut list: Vec<&Notification> = self
            .notifications
            .values()
            .filter(|n| n.recipient == user && (!unread_only || !n.is_read))
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            list.truncate(limit);
        }
        list
    }

    pub fn unread_count(&self, user: UserId) -> usize {
        self.notifications
            .values()
            .filter(|n| n.recipient == user && !n.is_read)
            .count()
    }

    fn owned_notification_mut(
        &mut self,
        actor: UserId,
        id: NotificationId,
    ) -> Result<&mut Notification> {
        let notification = self
            .notifications
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("notification", id))?;
        if notification.recipient != actor {
            return Err(LinkError::denied("notification belongs to another user"));
        }
        Ok(notification)
    }

    pub fn mark_read(&mut self, actor: UserId, id: NotificationId) -> Result<()> {
        let notification = self.owned_notification_mut(actor, id)?;
        notification.is_read = true;
        notification.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_unread(&mut self, actor: UserId, id: NotificationId) -> Result<()> {
        let notification = self.owned_notification_mut(actor, id)?;
        notification.is_read = false;
        notification.updated_at = Utc::now();
        Ok(())
    }

    /// Returns how many notifications changed
    pub fn mark_all_read(&mut self, user: UserId) -> usize {
        let now = Utc::now();
        let mut count = 0;
        for notification in self
            .notifications
            .values_mut()
            .filter(|n| n.recipient == user && !n.is_read)
        {
            notification.is_read = true;
            notification.updated_at = now;
            count += 1;
        }
        count
    }

    pub fn delete_notification(&mut self, actor: UserId, id: NotificationId) -> Result<()> {
        self.owned_notification_mut(actor, id)?;
        self.notifications.remove(&id);
        Ok(())
    }

    pub fn preferences(&self, user: UserId) -> NotificationPreferences {
        self.preferences.get(&user).cloned().unwrap_or_default()
    }

    pub fn update_preferences(
        &mut self,
        user: UserId,
        channel: Channel,
        category: &str,
        enabled: bool,
    ) -> Result<()> {
        self.ensure_user(user)?;
        if !PREFERENCE_CATEGORIES.contains(&category) {
            return Err(LinkError::invalid(format!(
                "unknown notification category: {}",
                category
            )));
        }
        self.preferences
            .entry(user)
            .or_default()
            .channel_mut(channel)
            .insert(category.to_string(), enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationType;
    use crate::users::NewUser;

    fn setup() -> (Store, UserId, UserId) {
        let mut store = Store::default();
        let a = store.register_user(NewUser::new("a", "a@x.io")).unwrap();
        let b = store.register_user(NewUser::new("b", "b@x.io")).unwrap();
        (store, a, b)
    }

    fn message_for(recipient: UserId) -> NewNotification {
        NewNotification::new(recipient, NotificationType::Message, "New message", "hi")
    }

    #[test]
    fn test_notify_dispatches_to_recipient_group() {
        let (mut store, a, _) = setup();
        store.notify(message_for(a)).unwrap();

        let queued = store.drain_dispatches();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].group, group::notifications(a));
        assert!(matches!(
            queued[0].event,
            HubEvent::NotificationMessage { .. }
        ));
    }

    #[test]
    fn test_disabled_category_is_stored_but_not_pushed() {
        let (mut store, a, _) = setup();
        store
            .update_preferences(a, Channel::InApp, "messages", false)
            .unwrap();
        store.notify(message_for(a)).unwrap();

        assert!(store.drain_dispatches().is_empty());
        assert_eq!(store.unread_count(a), 1);
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let (mut store, a, _) = setup();
        assert!(store
            .update_preferences(a, Channel::Push, "gossip", false)
            .is_err());
    }

    #[test]
    fn test_read_state_is_owner_only() {
        let (mut store, a, b) = setup();
        let id = store.notify(message_for(a)).unwrap();

        assert!(matches!(
            store.mark_read(b, id),
            Err(LinkError::PermissionDenied(_))
        ));
        store.mark_read(a, id).unwrap();
        assert_eq!(store.unread_count(a), 0);
        store.mark_unread(a, id).unwrap();
        assert_eq!(store.unread_count(a), 1);
        assert!(store.delete_notification(b, id).is_err());
        store.delete_notification(a, id).unwrap();
        assert!(store.notification(id).is_err());
    }

    #[test]
    fn test_listing_and_mark_all_read() {
        let (mut store, a, _) = setup();
        for _ in 0..3 {
            store.notify(message_for(a)).unwrap();
        }
        let first = store.notifications_for(a, false, Some(2));
        assert_eq!(first.len(), 2);
        assert!(first[0].id > first[1].id);

        assert_eq!(store.mark_all_read(a), 3);
        assert!(store.notifications_for(a, true, None).is_empty());
        assert_eq!(store.mark_all_read(a), 0);
    }
}
