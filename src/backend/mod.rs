//! Seam between the playback engine and the hosted story store.
//!
//! The engine never reaches the remote store directly: reads arrive through
//! [`Subscription`]s and writes go through [`StoryBackend`]. Every write is
//! treated as fire-and-forget by the engine, so implementations are free to
//! retry or fail without affecting playback.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::story::{StoryId, StoryItem, UserId};

pub use memory::MemoryStore;

#[async_trait]
pub trait StoryBackend: Send + Sync + 'static {
    /// Opens a live feed of snapshots for one item. Dropping the returned
    /// [`Subscription`] unsubscribes.
    async fn subscribe(&self, item_id: &StoryId) -> Result<Subscription>;

    /// Records that `viewer_id` has seen the item. Repeated calls are safe.
    async fn mark_viewed(&self, item_id: &StoryId, viewer_id: &UserId) -> Result<()>;

    /// Flips `viewer_id` in the item's liker set.
    async fn toggle_reaction(&self, item_id: &StoryId, viewer_id: &UserId) -> Result<()>;

    /// Delivers a reply to the story author's chat.
    async fn send_reply(&self, target_author_id: &UserId, text: &str) -> Result<()>;
}

/// Receiving end of a live item feed.
///
/// The producer keeps the [`SubscriptionFeed`]; once this side is dropped the
/// shared token is cancelled and the producer stops publishing.
pub struct Subscription {
    updates: mpsc::UnboundedReceiver<StoryItem>,
    cancel: CancellationToken,
}

/// Producing end of a live item feed.
#[derive(Clone)]
pub struct SubscriptionFeed {
    tx: mpsc::UnboundedSender<StoryItem>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn channel() -> (SubscriptionFeed, Subscription) {
        let (tx, updates) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (
            SubscriptionFeed {
                tx,
                cancel: cancel.clone(),
            },
            Subscription { updates, cancel },
        )
    }

    /// Next snapshot, or `None` once the feed has ended or been unsubscribed.
    pub async fn next(&mut self) -> Option<StoryItem> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            update = self.updates.recv() => update,
            _ = self.cancel.cancelled() => None,
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SubscriptionFeed {
    /// Pushes a snapshot. Returns `false` when the subscriber is gone.
    pub fn publish(&self, item: StoryItem) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(item).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(id: &str) -> StoryItem {
        let now = Utc::now();
        StoryItem {
            id: StoryId::new(id),
            media_ref: None,
            caption: None,
            created_at: now,
            expires_at: now + chrono::Duration::hours(24),
            viewer_ids: Default::default(),
            liker_ids: Default::default(),
        }
    }

    #[tokio::test]
    async fn dropping_subscription_closes_feed() {
        let (feed, mut sub) = Subscription::channel();
        assert!(feed.publish(snapshot("a")));
        assert_eq!(sub.next().await.map(|i| i.id), Some(StoryId::new("a")));

        sub.unsubscribe();
        assert!(feed.is_closed());
        assert!(!feed.publish(snapshot("a")));
    }

    #[tokio::test]
    async fn next_returns_none_when_producer_goes_away() {
        let (feed, mut sub) = Subscription::channel();
        drop(feed);
        assert!(sub.next().await.is_none());
    }
}
