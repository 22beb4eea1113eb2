//! Reactions and replies, plus the timed confirmation that holds playback.
//!
//! The coordinator never touches the clock itself. It tells the engine when
//! the `FeedbackAnimation` freeze should be taken or released: the hold lasts
//! while any reply is in flight or a confirmation window is open.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle, time};

use crate::backend::StoryBackend;
use crate::story::{StoryItem, UserId};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Feedback {
    Reaction { glyph: String },
    ReplySent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplyStatus {
    #[default]
    Idle,
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectEvent {
    ReplyFinished { ok: bool },
    WindowElapsed { token: u64 },
}

pub struct EffectsCoordinator {
    backend: Arc<dyn StoryBackend>,
    viewer: UserId,
    window: Duration,
    events: mpsc::UnboundedSender<EffectEvent>,
    replies_in_flight: usize,
    window_timer: Option<JoinHandle<()>>,
    window_token: u64,
    feedback: Option<Feedback>,
    reply_status: ReplyStatus,
    draft: String,
}

impl EffectsCoordinator {
    pub fn new(
        backend: Arc<dyn StoryBackend>,
        viewer: UserId,
        window: Duration,
        events: mpsc::UnboundedSender<EffectEvent>,
    ) -> Self {
        Self {
            backend,
            viewer,
            window,
            events,
            replies_in_flight: 0,
            window_timer: None,
            window_token: 0,
            feedback: None,
            reply_status: ReplyStatus::Idle,
            draft: String::new(),
        }
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn reply_status(&self) -> ReplyStatus {
        self.reply_status
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: String) {
        self.draft = text;
    }

    /// Whether the `FeedbackAnimation` hold is still needed.
    pub fn is_holding(&self) -> bool {
        self.replies_in_flight > 0 || self.window_timer.is_some()
    }

    /// Flips the viewer's like on `item` locally and writes it in the
    /// background. Returns `true` when playback should be held for the
    /// confirmation window.
    pub fn react(&mut self, item: &mut StoryItem, glyph: &str) -> bool {
        let liked = if item.liker_ids.remove(&self.viewer) {
            false
        } else {
            item.liker_ids.insert(self.viewer.clone());
            true
        };

        let backend = self.backend.clone();
        let item_id = item.id.clone();
        let viewer = self.viewer.clone();
        tokio::spawn(async move {
            if let Err(err) = backend.toggle_reaction(&item_id, &viewer).await {
                // The next live snapshot restores the remote state.
                log_warn!("reaction toggle on story {} failed: {err:?}", item_id);
            }
        });

        if !liked {
            return false;
        }
        self.feedback = Some(Feedback::Reaction {
            glyph: glyph.to_string(),
        });
        self.open_window();
        true
    }

    /// Sends `text` to the author. Blank text is ignored. Returns `true` when
    /// playback should be held until the send settles.
    pub fn reply(&mut self, target_author_id: &UserId, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        self.replies_in_flight += 1;
        self.reply_status = ReplyStatus::Sending;

        let backend = self.backend.clone();
        let target = target_author_id.clone();
        let text = text.to_string();
        let events = self.events.clone();
        tokio::spawn(async move {
            let ok = match backend.send_reply(&target, &text).await {
                Ok(()) => true,
                Err(err) => {
                    log_warn!("reply to {} failed: {err:?}", target);
                    false
                }
            };
            let _ = events.send(EffectEvent::ReplyFinished { ok });
        });

        true
    }

    /// Returns `true` when the hold can be released.
    pub fn on_event(&mut self, event: EffectEvent) -> bool {
        match event {
            EffectEvent::ReplyFinished { ok } => {
                self.replies_in_flight = self.replies_in_flight.saturating_sub(1);
                if ok {
                    log_info!("reply delivered");
                    self.draft.clear();
                    self.reply_status = ReplyStatus::Sent;
                    self.feedback = Some(Feedback::ReplySent);
                    self.open_window();
                } else {
                    // Nothing to confirm, so no window.
                    self.reply_status = ReplyStatus::Failed;
                }
            }
            EffectEvent::WindowElapsed { token } => {
                if token != self.window_token || self.window_timer.is_none() {
                    return false;
                }
                self.window_timer = None;
                self.feedback = None;
                if self.reply_status == ReplyStatus::Sent {
                    self.reply_status = ReplyStatus::Idle;
                }
            }
        }
        !self.is_holding()
    }

    /// Drops a settled reply outcome once another item becomes current.
    pub fn on_item_changed(&mut self) {
        if matches!(self.reply_status, ReplyStatus::Sent | ReplyStatus::Failed) {
            self.reply_status = ReplyStatus::Idle;
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.window_timer.take() {
            handle.abort();
        }
        self.feedback = None;
    }

    /// (Re)starts the confirmation window; a newer window replaces an older one.
    fn open_window(&mut self) {
        if let Some(handle) = self.window_timer.take() {
            handle.abort();
        }
        self.window_token = self.window_token.wrapping_add(1);
        let token = self.window_token;
        let deadline = time::Instant::now() + self.window;
        let events = self.events.clone();
        self.window_timer = Some(tokio::spawn(async move {
            time::sleep_until(deadline).await;
            let _ = events.send(EffectEvent::WindowElapsed { token });
        }));
    }
}

impl Drop for EffectsCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
