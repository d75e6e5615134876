//! Runtime facade over the store, the realtime hub and the AI model
//!
//! Store operations stay synchronous; every write goes through
//! [`SuperLink::write`], which publishes the dispatches the operation queued
//! once the lock is released.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::ai::ChatModel;
use crate::assistant;
use crate::config::Config;
use crate::errors::{LinkError, Result};
use crate::persistence::SnapshotStore;
use crate::realtime::{group, Envelope, Hub};
use crate::reply_suggestions::{self, ReplySuggestion, SuggestionType};
use crate::store::Store;
use crate::suggestions::{self, UserSuggestion};
use crate::types::{ConversationId, Page, UserId};
use crate::users::OnlineStatus;

pub struct SuperLink {
    store: Arc<RwLock<Store>>,
    hub: Hub,
    ai: Option<Arc<dyn ChatModel>>,
    config: Config,
}

impl SuperLink {
    pub fn new(config: Config) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::new(config.clone()))),
            hub: Hub::new(),
            ai: None,
            config,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        info!(model = model.model_name(), "AI model attached");
        self.ai = Some(model);
        self
    }

    /// Replace the store, applying this platform's configuration to it
    pub fn with_store(mut self, mut store: Store) -> Self {
        store.set_config(self.config.clone());
        self.store = Arc::new(RwLock::new(store));
        self
    }

    /// Open the snapshot in `snapshots`, or start empty
    pub fn load(config: Config, snapshots: &SnapshotStore) -> Result<Self> {
        let store = snapshots.load()?;
        Ok(Self::new(config).with_store(store))
    }

    pub async fn save(&self, snapshots: &SnapshotStore) -> Result<PathBuf> {
        let store = self.store.read().await;
        snapshots.save(&store)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn has_model(&self) -> bool {
        self.ai.is_some()
    }

    fn model(&self) -> Result<&dyn ChatModel> {
        self.ai
            .as_deref()
            .ok_or_else(|| LinkError::AiUnavailable("no AI model configured".to_string()))
    }

    /// Run a mutation and publish whatever it queued, even when it failed
    pub async fn write<T>(&self, op: impl FnOnce(&mut Store) -> Result<T>) -> Result<T> {
        let (result, dispatches) = {
            let mut store = self.store.write().await;
            let result = op(&mut store);
            (result, store.drain_dispatches())
        };
        if !dispatches.is_empty() {
            let delivered = self.hub.publish_all(dispatches);
            debug!(delivered, "dispatches published");
        }
        result
    }

    pub async fn read<T>(&self, op: impl FnOnce(&Store) -> T) -> T {
        let store = self.store.read().await;
        op(&store)
    }

    async fn flush(&self) {
        let dispatches = self.store.write().await.drain_dispatches();
        if !dispatches.is_empty() {
            self.hub.publish_all(dispatches);
        }
    }

    /// Mark the user online and subscribe to their notification group
    pub async fn connect(&self, user: UserId) -> Result<broadcast::Receiver<Envelope>> {
        let receiver = self.hub.subscribe(&group::notifications(user));
        self.write(|store| store.touch_activity(user, Utc::now()))
            .await?;
        info!(user_id = %user, "user connected");
        Ok(receiver)
    }

    pub async fn disconnect(&self, user: UserId) -> Result<()> {
        self.write(|store| {
            store.touch_activity(user, Utc::now())?;
            store.set_online_status(user, OnlineStatus::Offline)
        })
        .await?;
        self.hub.prune();
        info!(user_id = %user, "user disconnected");
        Ok(())
    }

    pub async fn generate_suggestions(
        &self,
        user: UserId,
        page: usize,
        page_size: usize,
        purpose: Option<&str>,
    ) -> Result<Page<UserSuggestion>> {
        let model = self.model()?;
        let result =
            suggestions::generate_suggestions(&self.store, model, user, page, page_size, purpose)
                .await;
        self.flush().await;
        result
    }

    pub async fn interest_alchemy(
        &self,
        user: UserId,
        purpose: Option<&str>,
    ) -> Result<Option<UserSuggestion>> {
        let model = self.model()?;
        let result = suggestions::interest_alchemy(&self.store, model, user, purpose).await;
        self.flush().await;
        result
    }

    pub async fn top_alchemy_suggestions(
        &self,
        user: UserId,
        purpose: Option<&str>,
        top_n: usize,
    ) -> Result<Vec<UserSuggestion>> {
        let model = self.model()?;
        let result =
            suggestions::top_alchemy_suggestions(&self.store, model, user, purpose, top_n).await;
        self.flush().await;
        result
    }

    /// Empty without a model
    pub async fn suggest_replies(
        &self,
        conversation: ConversationId,
        user: UserId,
        types: &[SuggestionType],
        max: Option<usize>,
        custom_prompt: Option<&str>,
    ) -> Result<Vec<ReplySuggestion>> {
        let Some(model) = self.ai.as_deref() else {
            debug!("reply suggestions skipped, no model configured");
            return Ok(Vec::new());
        };
        reply_suggestions::suggest_replies(
            &self.store,
            model,
            conversation,
            user,
            types,
            max,
            custom_prompt,
        )
        .await
    }

    pub async fn ask_assistant(&self, user: UserId, message: &str) -> Result<String> {
        let model = self.model()?;
        let result = assistant::ask(&self.store, model, user, message).await;
        self.flush().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::HubEvent;
    use crate::users::NewUser;

    #[tokio::test]
    async fn test_write_publishes_dispatches() {
        let platform = SuperLink::new(Config::default());
        let (ada, bob) = platform
            .write(|store| {
                let ada = store.register_user(NewUser::new("ada", "ada@x.io"))?;
                let bob = store.register_user(NewUser::new("bob", "bob@x.io"))?;
                Ok((ada, bob))
            })
            .await
            .unwrap();

        let mut receiver = platform.connect(bob).await.unwrap();
        platform
            .write(|store| store.send_connection_request(ada, bob, "hi"))
            .await
            .unwrap();

        let envelope = receiver.recv().await.unwrap();
        assert!(matches!(envelope.event, HubEvent::NotificationMessage { .. }));
        let pending = platform.read(|store| store.pending_dispatches().len()).await;
        assert_eq!(pending, 0);
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_toggle_presence() {
        let platform = SuperLink::new(Config::default());
        let ada = platform
            .write(|store| store.register_user(NewUser::new("ada", "ada@x.io")))
            .await
            .unwrap();

        let _receiver = platform.connect(ada).await.unwrap();
        let status = platform
            .read(|store| store.user(ada).map(|u| u.online_status))
            .await
            .unwrap();
        assert_eq!(status, OnlineStatus::Online);

        platform.disconnect(ada).await.unwrap();
        let status = platform
            .read(|store| store.user(ada).map(|u| u.online_status))
            .await
            .unwrap();
        assert_eq!(status, OnlineStatus::Offline);
        assert!(platform.connect(UserId(999)).await.is_err());
    }

    #[tokio::test]
    async fn test_ai_operations_without_model() {
        let platform = SuperLink::new(Config::default());
        let ada = platform
            .write(|store| store.register_user(NewUser::new("ada", "ada@x.io")))
            .await
            .unwrap();

        assert!(!platform.has_model());
        assert!(matches!(
            platform.generate_suggestions(ada, 1, 10, None).await,
            Err(LinkError::AiUnavailable(_))
        ));
        assert!(matches!(
            platform.ask_assistant(ada, "hello").await,
            Err(LinkError::AiUnavailable(_))
        ));
        let replies = platform
            .suggest_replies(ConversationId(1), ada, &[], None, None)
            .await
            .unwrap();
        assert!(replies.is_empty());
    }
}
