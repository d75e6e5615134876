//! Publish/subscribe hub with bounded broadcast channels per group

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::events::{Dispatch, Envelope, HubEvent};

/// Channel capacity per group; slow subscribers lag instead of blocking producers
pub const GROUP_CAPACITY: usize = 256;

/// Group registry shared by every clone of the hub
#[derive(Clone, Default)]
pub struct Hub {
    groups: Arc<Mutex<HashMap<String, broadcast::Sender<Envelope>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a group, creating it on demand
    pub fn subscribe(&self, group: &str) -> broadcast::Receiver<Envelope> {
        let mut groups = self.lock();
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(GROUP_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event; returns how many subscribers received it
    pub fn publish(&self, group: &str, event: HubEvent) -> usize {
        let sender = {
            let groups = self.lock();
            groups.get(group).cloned()
        };

        let Some(sender) = sender else {
            trace!(group, "no subscribers, event dropped");
            return 0;
        };

        let envelope = Envelope {
            group: group.to_string(),
            event,
            sent_at: Utc::now(),
        };

        // send only fails when every receiver is gone
        match sender.send(envelope) {
            Ok(receivers) => {
                debug!(group, receivers, "event published");
                receivers
            }
            Err(_) => 0,
        }
    }

    /// Publish a batch of queued dispatches
    pub fn publish_all(&self, dispatches: Vec<Dispatch>) -> usize {
        dispatches
            .into_iter()
            .map(|dispatch| self.publish(&dispatch.group, dispatch.event))
            .sum()
    }

    /// Drop groups nobody listens to anymore
    pub fn prune(&self) -> usize {
        let mut groups = self.lock();
        let before = groups.len();
        groups.retain(|_, sender| sender.receiver_count() > 0);
        before - groups.len()
    }

    pub fn group_count(&self) -> usize {
        self.lock().len()
    }

    pub fn subscriber_count(&self, group: &str) -> usize {
        self.lock()
            .get(group)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<Envelope>>> {
        // a poisoned registry still holds valid senders
        self.groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConversationId, UserId};
    use tokio::time::{timeout, Duration};

    fn receipt() -> HubEvent {
        HubEvent::ReadReceipt {
            conversation_id: ConversationId(1),
            user_id: UserId(2),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let hub = Hub::new();
        let mut rx = hub.subscribe("chat_1");

        assert_eq!(hub.publish("chat_1", receipt()), 1);

        let envelope = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Channel closed");
        assert_eq!(envelope.group, "chat_1");
        assert_eq!(envelope.event, receipt());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = Hub::new();
        assert_eq!(hub.publish("nobody", receipt()), 0);
        assert_eq!(hub.group_count(), 0);
    }

    #[test]
    fn test_prune_removes_abandoned_groups() {
        let hub = Hub::new();
        let rx = hub.subscribe("a");
        let _keep = hub.subscribe("b");
        drop(rx);

        assert_eq!(hub.prune(), 1);
        assert_eq!(hub.group_count(), 1);
        assert_eq!(hub.subscriber_count("b"), 1);
    }

    #[tokio::test]
    async fn test_publish_all_counts_deliveries() {
        let hub = Hub::new();
        let _a = hub.subscribe("x");
        let _b = hub.subscribe("x");

        let delivered = hub.publish_all(vec![
            Dispatch {
                group: "x".to_string(),
                event: receipt(),
            },
            Dispatch {
                group: "y".to_string(),
                event: receipt(),
            },
        ]);
        assert_eq!(delivered, 2);
    }

    #[test]
    fn test_groups_are_isolated() {
        let hub = Hub::new();
        let mut chat = hub.subscribe("chat_1");
        let mut other = hub.subscribe("chat_2");

        let mut pending = tokio_test::task::spawn(other.recv());
        tokio_test::assert_pending!(pending.poll());

        hub.publish("chat_1", receipt());
        assert!(!pending.is_woken());
        tokio_test::assert_pending!(pending.poll());
        drop(pending);

        let envelope = tokio_test::block_on(chat.recv()).unwrap();
        assert_eq!(envelope.group, "chat_1");
    }
}
