//! The viewing session: one tokio task that owns all playback state.
//!
//! Host calls, clock ticks, live updates and effect results all arrive as
//! messages on this task, so they are handled one at a time and never observe
//! each other half-applied. [`StoryPlayer`] is the host's handle to it.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::clock::{Clock, ClockEvent, ClockStart};
use super::effects::{EffectEvent, EffectsCoordinator};
use super::interruption::{FreezeReason, InterruptionController};
use super::live::{merge_snapshot, LiveBridge, LiveUpdate, ViewedLedger};
use super::sequencer::{Sequencer, Step};
use super::state::{
    segment_states, CloseReason, PlaybackSnapshot, PlaybackStatus, PlayerEvent, TapRegion,
};
use crate::backend::StoryBackend;
use crate::settings::{self, PlayerSettings};
use crate::story::{StoryGroup, UserId};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug)]
enum Command {
    Snapshot,
    PauseManual,
    ResumeManual,
    SetInputFocused(bool),
    Tap(TapRegion),
    Advance,
    Retreat,
    JumpTo(usize),
    React(String),
    Reply(String),
    SetDraft(String),
    Close,
}

struct Request {
    command: Command,
    reply: oneshot::Sender<PlaybackSnapshot>,
}

/// Host handle to a viewing session. Cheap to clone; the session closes when
/// [`StoryPlayer::close`] is called or the last handle is dropped.
#[derive(Clone)]
pub struct StoryPlayer {
    requests: mpsc::UnboundedSender<Request>,
    snapshots: watch::Receiver<PlaybackSnapshot>,
}

impl StoryPlayer {
    /// Opens a session on `group` for `viewer_id` and starts playing the
    /// first non-expired item. Host events arrive on the returned receiver.
    ///
    /// Must be called from within a Tokio runtime: the session task and its
    /// timers are spawned here.
    pub fn open(
        group: StoryGroup,
        viewer_id: UserId,
        backend: Arc<dyn StoryBackend>,
        settings: PlayerSettings,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PlayerEvent>)> {
        settings.validate()?;

        let session_id = Uuid::new_v4().to_string();
        let group = group.playable(Utc::now());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        let StoryGroup {
            author_id,
            author_display_name,
            author_avatar_ref,
            items,
        } = group;

        let Some(sequencer) = Sequencer::new(items) else {
            log_info!("session {} has nothing to play; closing", session_id);
            let snapshot = PlaybackSnapshot {
                session_id,
                author_id,
                author_display_name,
                author_avatar_ref,
                status: PlaybackStatus::Closed,
                current_index: 0,
                item_count: 0,
                current_item: None,
                elapsed_ms: 0,
                progress_fraction: 0.0,
                segments: Vec::new(),
                freeze_reasons: Vec::new(),
                liked_by_viewer: false,
                feedback: None,
                reply_status: Default::default(),
                draft: String::new(),
            };
            let (_snapshot_tx, snapshot_rx) = watch::channel(snapshot);
            let _ = events_tx.send(PlayerEvent::Closed {
                reason: CloseReason::Empty,
            });
            return Ok((
                Self {
                    requests: requests_tx,
                    snapshots: snapshot_rx,
                },
                events_rx,
            ));
        };

        let (clock_tx, clock_rx) = mpsc::unbounded_channel();
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        let (effects_tx, effects_rx) = mpsc::unbounded_channel();

        let mut engine = Engine {
            session_id,
            viewer: viewer_id.clone(),
            author_id,
            author_display_name,
            author_avatar_ref,
            log_samples: settings::debug_enabled(),
            sequencer,
            clock: Clock::new(settings.item_duration(), settings.sample_interval(), clock_tx),
            interruptions: InterruptionController::new(),
            live: LiveBridge::new(backend.clone(), live_tx),
            ledger: ViewedLedger::new(),
            effects: EffectsCoordinator::new(
                backend.clone(),
                viewer_id,
                settings.feedback_window(),
                effects_tx,
            ),
            backend,
            status: PlaybackStatus::Idle,
            closed: None,
            events: events_tx,
            snapshots: None,
        };

        engine.enter_current();
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        engine.snapshots = Some(snapshot_tx);

        log_info!(
            "session {} opened on {} ({} items)",
            engine.session_id,
            engine.author_id,
            engine.sequencer.len()
        );
        tokio::spawn(engine.run(requests_rx, clock_rx, live_rx, effects_rx));

        Ok((
            Self {
                requests: requests_tx,
                snapshots: snapshot_rx,
            },
            events_rx,
        ))
    }

    /// Latest published state without a round trip to the session.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch channel updated on every state change and progress sample.
    pub fn watch(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.clone()
    }

    /// Fresh state, taken after every message queued before this call.
    pub async fn refresh(&self) -> Result<PlaybackSnapshot> {
        self.send(Command::Snapshot).await
    }

    pub async fn pause_manual(&self) -> Result<PlaybackSnapshot> {
        self.send(Command::PauseManual).await
    }

    pub async fn resume_manual(&self) -> Result<PlaybackSnapshot> {
        self.send(Command::ResumeManual).await
    }

    pub async fn set_input_focused(&self, focused: bool) -> Result<PlaybackSnapshot> {
        self.send(Command::SetInputFocused(focused)).await
    }

    /// Screen-region tap; ignored while the reply field has focus.
    pub async fn tap(&self, region: TapRegion) -> Result<PlaybackSnapshot> {
        self.send(Command::Tap(region)).await
    }

    pub async fn advance(&self) -> Result<PlaybackSnapshot> {
        self.send(Command::Advance).await
    }

    pub async fn retreat(&self) -> Result<PlaybackSnapshot> {
        self.send(Command::Retreat).await
    }

    pub async fn jump_to(&self, index: usize) -> Result<PlaybackSnapshot> {
        self.send(Command::JumpTo(index)).await
    }

    pub async fn react(&self, glyph: &str) -> Result<PlaybackSnapshot> {
        self.send(Command::React(glyph.to_string())).await
    }

    pub async fn reply(&self, text: &str) -> Result<PlaybackSnapshot> {
        self.send(Command::Reply(text.to_string())).await
    }

    pub async fn set_draft(&self, text: &str) -> Result<PlaybackSnapshot> {
        self.send(Command::SetDraft(text.to_string())).await
    }

    pub async fn close(&self) -> Result<PlaybackSnapshot> {
        self.send(Command::Close).await
    }

    async fn send(&self, command: Command) -> Result<PlaybackSnapshot> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .map_err(|_| anyhow!("story session is closed"))?;
        response
            .await
            .map_err(|_| anyhow!("story session is closed"))
    }
}

struct Engine {
    session_id: String,
    viewer: UserId,
    author_id: UserId,
    author_display_name: String,
    author_avatar_ref: Option<String>,
    log_samples: bool,
    sequencer: Sequencer,
    clock: Clock,
    interruptions: InterruptionController,
    live: LiveBridge,
    ledger: ViewedLedger,
    effects: EffectsCoordinator,
    backend: Arc<dyn StoryBackend>,
    status: PlaybackStatus,
    closed: Option<CloseReason>,
    events: mpsc::UnboundedSender<PlayerEvent>,
    snapshots: Option<watch::Sender<PlaybackSnapshot>>,
}

impl Engine {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut clock_rx: mpsc::UnboundedReceiver<ClockEvent>,
        mut live_rx: mpsc::UnboundedReceiver<LiveUpdate>,
        mut effects_rx: mpsc::UnboundedReceiver<EffectEvent>,
    ) {
        while self.closed.is_none() {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request { command, reply }) => {
                        self.handle(command);
                        self.publish();
                        let _ = reply.send(self.snapshot());
                        continue;
                    }
                    None => {
                        log_info!("session {}: every handle dropped", self.session_id);
                        self.close(CloseReason::Dismissed);
                    }
                },
                Some(event) = clock_rx.recv() => self.on_clock(event),
                Some(update) = live_rx.recv() => self.on_live(update),
                Some(event) = effects_rx.recv() => self.on_effect(event),
            }
            self.publish();
        }
        log_info!("session {} closed", self.session_id);
    }

    fn handle(&mut self, command: Command) {
        if self.closed.is_some() {
            return;
        }
        match command {
            Command::Snapshot => {}
            Command::PauseManual => self.freeze(FreezeReason::Manual),
            Command::ResumeManual => self.thaw(FreezeReason::Manual),
            Command::SetInputFocused(true) => self.freeze(FreezeReason::InputFocus),
            Command::SetInputFocused(false) => self.thaw(FreezeReason::InputFocus),
            Command::Tap(region) => {
                if !self.interruptions.tap_navigation_allowed() {
                    log_debug!("tap ignored while composing a reply");
                    return;
                }
                match region {
                    TapRegion::Back => self.navigate(|seq| seq.retreat()),
                    TapRegion::Forward => self.navigate(|seq| seq.advance()),
                }
            }
            Command::Advance => self.navigate(|seq| seq.advance()),
            Command::Retreat => self.navigate(|seq| seq.retreat()),
            Command::JumpTo(index) => self.navigate(|seq| seq.jump_to(index)),
            Command::React(glyph) => {
                let item = self.sequencer.current_mut();
                if self.effects.react(item, &glyph) {
                    self.freeze(FreezeReason::FeedbackAnimation);
                }
            }
            Command::Reply(text) => {
                if self.effects.reply(&self.author_id, &text) {
                    self.freeze(FreezeReason::FeedbackAnimation);
                }
            }
            Command::SetDraft(text) => self.effects.set_draft(text),
            Command::Close => self.close(CloseReason::Dismissed),
        }
    }

    fn freeze(&mut self, reason: FreezeReason) {
        if self.interruptions.add(reason, &mut self.clock) {
            self.status = PlaybackStatus::Paused;
            log_debug!(
                "paused at {}ms by {:?}",
                self.clock.elapsed().as_millis(),
                reason
            );
        }
    }

    fn thaw(&mut self, reason: FreezeReason) {
        let item_id = self.sequencer.current().id.clone();
        match self.interruptions.remove(reason, &mut self.clock, &item_id) {
            Some(ClockStart::Scheduled) => {
                self.status = PlaybackStatus::Running;
                log_debug!("resumed at {}ms", self.clock.elapsed().as_millis());
            }
            Some(ClockStart::Exhausted) => self.complete_current(),
            None => {}
        }
    }

    fn navigate(&mut self, step: impl FnOnce(&mut Sequencer) -> Step) {
        match step(&mut self.sequencer) {
            Step::Moved { from, to } => {
                self.effects.on_item_changed();
                if to > from {
                    self.emit(PlayerEvent::Advanced { from, to });
                } else if to < from {
                    self.emit(PlayerEvent::Retreated { from, to });
                }
                self.enter_current();
            }
            Step::Finished => self.close(CloseReason::Finished),
            Step::Stay => {}
        }
    }

    /// Idle→Running on the current item: restart from zero, follow its live
    /// feed and mark it viewed the first time this session.
    fn enter_current(&mut self) {
        self.status = PlaybackStatus::Idle;
        let item_id = self.sequencer.current().id.clone();

        self.live.follow(&item_id);

        if self.ledger.first_view(&item_id) {
            self.sequencer
                .current_mut()
                .viewer_ids
                .insert(self.viewer.clone());

            let backend = self.backend.clone();
            let viewer = self.viewer.clone();
            let item_id = item_id.clone();
            tokio::spawn(async move {
                if let Err(err) = backend.mark_viewed(&item_id, &viewer).await {
                    log_warn!("mark viewed for story {} failed: {err:?}", item_id);
                }
            });
        }

        match self.interruptions.enter_item(&mut self.clock, &item_id) {
            Some(ClockStart::Scheduled) => self.status = PlaybackStatus::Running,
            Some(ClockStart::Exhausted) => self.complete_current(),
            None => self.status = PlaybackStatus::Paused,
        }
    }

    fn on_clock(&mut self, event: ClockEvent) {
        let (item, epoch, is_completion) = match event {
            ClockEvent::Sample { item, epoch } => (item, epoch, false),
            ClockEvent::Complete { item, epoch } => (item, epoch, true),
        };

        if item != self.sequencer.current().id || !self.clock.is_current(epoch) {
            log_debug!("dropping stale clock message for story {}", item);
            return;
        }

        // A sample that lands at or past the end completes the item itself;
        // the completion message queued behind it is then stale.
        if is_completion || self.clock.elapsed() >= self.clock.duration() {
            self.complete_current();
        } else if self.log_samples {
            log_debug!(
                "story {} at {:.0}%",
                item,
                self.clock.progress_fraction() * 100.0
            );
        }
    }

    fn complete_current(&mut self) {
        self.clock.finish();
        self.status = PlaybackStatus::Completed;
        log_debug!("story {} completed", self.sequencer.current().id);
        self.navigate(|seq| seq.advance());
    }

    fn on_live(&mut self, update: LiveUpdate) {
        if !self.live.accepts(&update) || update.item_id != self.sequencer.current().id {
            log_debug!("dropping live update for story {}", update.item_id);
            return;
        }
        let viewed_here = self.ledger.contains(&update.item_id);
        merge_snapshot(
            self.sequencer.current_mut(),
            update.snapshot,
            &self.viewer,
            viewed_here,
        );
    }

    fn on_effect(&mut self, event: EffectEvent) {
        if let EffectEvent::ReplyFinished { ok } = event {
            self.emit(if ok {
                PlayerEvent::ReplySent
            } else {
                PlayerEvent::ReplyFailed
            });
        }
        if self.effects.on_event(event) {
            self.thaw(FreezeReason::FeedbackAnimation);
        }
    }

    /// Tears the session down: no clock, live or feedback task outlives this.
    fn close(&mut self, reason: CloseReason) {
        if self.closed.is_some() {
            return;
        }
        self.clock.pause();
        self.live.unfollow();
        self.effects.shutdown();
        self.closed = Some(reason);
        self.status = PlaybackStatus::Closed;
        log_info!("session {} closing: {:?}", self.session_id, reason);
        self.emit(PlayerEvent::Closed { reason });
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        if let Some(snapshots) = &self.snapshots {
            snapshots.send_replace(self.snapshot());
        }
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        let item = self.sequencer.current();
        PlaybackSnapshot {
            session_id: self.session_id.clone(),
            author_id: self.author_id.clone(),
            author_display_name: self.author_display_name.clone(),
            author_avatar_ref: self.author_avatar_ref.clone(),
            status: self.status,
            current_index: self.sequencer.index(),
            item_count: self.sequencer.len(),
            current_item: Some(item.clone()),
            elapsed_ms: self.clock.elapsed().as_millis() as u64,
            progress_fraction: self.clock.progress_fraction(),
            segments: segment_states(self.sequencer.len(), self.sequencer.index()),
            freeze_reasons: self.interruptions.reasons(),
            liked_by_viewer: item.is_liked_by(&self.viewer),
            feedback: self.effects.feedback().cloned(),
            reply_status: self.effects.reply_status(),
            draft: self.effects.draft().to_string(),
        }
    }
}
