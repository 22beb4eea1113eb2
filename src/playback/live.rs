//! Live reconciliation of the currently playing item.
//!
//! Exactly one subscription is open at a time, keyed by the current item.
//! Updates are tagged with the item id and a subscription generation so the
//! engine can drop anything that raced with an item change.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::backend::StoryBackend;
use crate::story::{StoryId, StoryItem, UserId};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct LiveUpdate {
    pub item_id: StoryId,
    pub generation: u64,
    pub snapshot: StoryItem,
}

struct ActiveFeed {
    item_id: StoryId,
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct LiveBridge {
    backend: Arc<dyn StoryBackend>,
    updates: mpsc::UnboundedSender<LiveUpdate>,
    active: Option<ActiveFeed>,
    generation: u64,
}

impl LiveBridge {
    pub fn new(backend: Arc<dyn StoryBackend>, updates: mpsc::UnboundedSender<LiveUpdate>) -> Self {
        Self {
            backend,
            updates,
            active: None,
            generation: 0,
        }
    }

    pub fn followed_item(&self) -> Option<&StoryId> {
        self.active.as_ref().map(|feed| &feed.item_id)
    }

    /// Switches the live feed to `item_id`. Following the item already
    /// followed keeps the existing subscription.
    pub fn follow(&mut self, item_id: &StoryId) {
        if self.followed_item() == Some(item_id) {
            return;
        }
        self.unfollow();

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let cancel = CancellationToken::new();

        let task = tokio::spawn(forward_updates(
            self.backend.clone(),
            item_id.clone(),
            generation,
            cancel.clone(),
            self.updates.clone(),
        ));

        self.active = Some(ActiveFeed {
            item_id: item_id.clone(),
            generation,
            cancel,
            task,
        });
    }

    pub fn unfollow(&mut self) {
        if let Some(feed) = self.active.take() {
            feed.cancel.cancel();
            feed.task.abort();
        }
    }

    /// Whether `update` belongs to the feed that is open right now.
    pub fn accepts(&self, update: &LiveUpdate) -> bool {
        match &self.active {
            Some(feed) => {
                feed.generation == update.generation
                    && feed.item_id == update.item_id
                    && update.snapshot.id == update.item_id
            }
            None => false,
        }
    }
}

impl Drop for LiveBridge {
    fn drop(&mut self) {
        self.unfollow();
    }
}

async fn forward_updates(
    backend: Arc<dyn StoryBackend>,
    item_id: StoryId,
    generation: u64,
    cancel: CancellationToken,
    updates: mpsc::UnboundedSender<LiveUpdate>,
) {
    let subscribed = tokio::select! {
        result = backend.subscribe(&item_id) => result,
        _ = cancel.cancelled() => return,
    };

    let mut subscription = match subscribed {
        Ok(subscription) => subscription,
        Err(err) => {
            // Playback keeps the last known snapshot until the next item change.
            log_warn!("live subscription for story {} failed: {err:?}", item_id);
            return;
        }
    };

    loop {
        tokio::select! {
            next = subscription.next() => {
                let Some(snapshot) = next else {
                    log_info!("live feed for story {} ended", item_id);
                    break;
                };
                let update = LiveUpdate {
                    item_id: item_id.clone(),
                    generation,
                    snapshot,
                };
                if updates.send(update).is_err() {
                    break;
                }
            }
            _ = cancel.cancelled() => {
                log_debug!("unsubscribed from story {}", item_id);
                break;
            }
        }
    }
}

/// Copies the remote snapshot's mutable fields into `target`.
///
/// Likes and content are taken as-is so a failed local toggle reverts here.
/// Viewers are the remote set plus `viewer` when this session already marked
/// the item, so viewer membership only grows.
pub fn merge_snapshot(target: &mut StoryItem, snapshot: StoryItem, viewer: &UserId, viewed_here: bool) {
    let StoryItem {
        id,
        media_ref,
        caption,
        created_at: _,
        expires_at,
        mut viewer_ids,
        liker_ids,
    } = snapshot;

    if id != target.id {
        return;
    }

    if viewed_here {
        viewer_ids.insert(viewer.clone());
    }

    target.media_ref = media_ref;
    target.caption = caption;
    target.expires_at = expires_at;
    target.viewer_ids = viewer_ids;
    target.liker_ids = liker_ids;
}

/// Items already marked viewed in this session.
#[derive(Debug, Default)]
pub struct ViewedLedger {
    marked: HashSet<StoryId>,
}

impl ViewedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `item_id` is seen this session.
    pub fn first_view(&mut self, item_id: &StoryId) -> bool {
        self.marked.insert(item_id.clone())
    }

    pub fn contains(&self, item_id: &StoryId) -> bool {
        self.marked.contains(item_id)
    }
}
