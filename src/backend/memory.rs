use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use log::debug;

use super::{StoryBackend, Subscription, SubscriptionFeed};
use crate::story::{StoryGroup, StoryId, StoryItem, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub target_author_id: UserId,
    pub text: String,
}

#[derive(Default)]
struct StoreInner {
    items: HashMap<StoryId, StoryItem>,
    feeds: HashMap<StoryId, Vec<SubscriptionFeed>>,
    replies: Vec<SentReply>,
    mark_viewed_calls: HashMap<StoryId, usize>,
    reaction_calls: usize,
    fail_subscriptions: bool,
    fail_reactions: bool,
    fail_replies: bool,
    reply_latency: Duration,
}

/// In-process story store. Backs the demo binary and the engine tests, and
/// can inject failures and latency into each external call.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(group: &StoryGroup) -> Self {
        let store = Self::new();
        store.insert_group(group);
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert_group(&self, group: &StoryGroup) {
        let mut inner = self.lock();
        for item in &group.items {
            inner.items.insert(item.id.clone(), item.clone());
        }
    }

    pub fn item(&self, id: &StoryId) -> Option<StoryItem> {
        self.lock().items.get(id).cloned()
    }

    /// Applies `change` to the stored item and publishes the result to its
    /// subscribers.
    pub fn update<F>(&self, id: &StoryId, change: F) -> Result<StoryItem>
    where
        F: FnOnce(&mut StoryItem),
    {
        let mut inner = self.lock();
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| anyhow!("unknown story {id}"))?;
        change(item);
        let updated = item.clone();
        publish_locked(&mut inner, updated.clone());
        Ok(updated)
    }

    /// Publishes an arbitrary snapshot without storing it.
    pub fn publish(&self, item: StoryItem) {
        publish_locked(&mut self.lock(), item);
    }

    pub fn subscriber_count(&self, id: &StoryId) -> usize {
        self.lock()
            .feeds
            .get(id)
            .map(|feeds| feeds.iter().filter(|feed| !feed.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn mark_viewed_calls(&self, id: &StoryId) -> usize {
        self.lock().mark_viewed_calls.get(id).copied().unwrap_or(0)
    }

    pub fn reaction_calls(&self) -> usize {
        self.lock().reaction_calls
    }

    pub fn sent_replies(&self) -> Vec<SentReply> {
        self.lock().replies.clone()
    }

    pub fn set_fail_subscriptions(&self, fail: bool) {
        self.lock().fail_subscriptions = fail;
    }

    pub fn set_fail_reactions(&self, fail: bool) {
        self.lock().fail_reactions = fail;
    }

    pub fn set_fail_replies(&self, fail: bool) {
        self.lock().fail_replies = fail;
    }

    pub fn set_reply_latency(&self, latency: Duration) {
        self.lock().reply_latency = latency;
    }
}

fn publish_locked(inner: &mut StoreInner, item: StoryItem) {
    if let Some(feeds) = inner.feeds.get_mut(&item.id) {
        feeds.retain(|feed| feed.publish(item.clone()));
    }
}

#[async_trait]
impl StoryBackend for MemoryStore {
    async fn subscribe(&self, item_id: &StoryId) -> Result<Subscription> {
        let mut inner = self.lock();
        if inner.fail_subscriptions {
            bail!("subscription to {item_id} refused");
        }
        let (feed, subscription) = Subscription::channel();
        inner
            .feeds
            .entry(item_id.clone())
            .or_default()
            .push(feed);
        debug!("subscribed to story {item_id}");
        Ok(subscription)
    }

    async fn mark_viewed(&self, item_id: &StoryId, viewer_id: &UserId) -> Result<()> {
        let mut inner = self.lock();
        *inner.mark_viewed_calls.entry(item_id.clone()).or_default() += 1;
        let item = inner
            .items
            .get_mut(item_id)
            .ok_or_else(|| anyhow!("unknown story {item_id}"))?;
        if item.viewer_ids.insert(viewer_id.clone()) {
            let updated = item.clone();
            publish_locked(&mut inner, updated);
        }
        Ok(())
    }

    async fn toggle_reaction(&self, item_id: &StoryId, viewer_id: &UserId) -> Result<()> {
        let mut inner = self.lock();
        inner.reaction_calls += 1;
        if inner.fail_reactions {
            bail!("reaction on {item_id} rejected");
        }
        let item = inner
            .items
            .get_mut(item_id)
            .ok_or_else(|| anyhow!("unknown story {item_id}"))?;
        if !item.liker_ids.remove(viewer_id) {
            item.liker_ids.insert(viewer_id.clone());
        }
        let updated = item.clone();
        publish_locked(&mut inner, updated);
        Ok(())
    }

    async fn send_reply(&self, target_author_id: &UserId, text: &str) -> Result<()> {
        let latency = self.lock().reply_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        if inner.fail_replies {
            bail!("reply to {target_author_id} could not be delivered");
        }
        inner.replies.push(SentReply {
            target_author_id: target_author_id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}
