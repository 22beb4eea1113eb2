use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;

use super::clock::{Clock, ClockStart};
use crate::story::StoryId;

/// Named cause currently holding playback still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FreezeReason {
    /// The viewer is holding the screen.
    Manual,
    /// The reply field has focus.
    InputFocus,
    /// Reaction or reply confirmation is on screen.
    FeedbackAnimation,
}

impl FreezeReason {
    pub fn is_text_entry(self) -> bool {
        matches!(self, FreezeReason::InputFocus)
    }
}

/// Gates the clock on a set of freeze reasons: it runs iff the set is empty.
///
/// Adding a present reason or removing an absent one has no effect on the
/// clock.
#[derive(Debug, Default)]
pub struct InterruptionController {
    reasons: BTreeSet<FreezeReason>,
}

impl InterruptionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_frozen(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn contains(&self, reason: FreezeReason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn reasons(&self) -> Vec<FreezeReason> {
        self.reasons.iter().copied().collect()
    }

    /// Tap navigation is ignored while the viewer is typing.
    pub fn tap_navigation_allowed(&self) -> bool {
        !self.reasons.iter().any(|reason| reason.is_text_entry())
    }

    /// Returns `true` when this add froze a running clock.
    pub fn add(&mut self, reason: FreezeReason, clock: &mut Clock) -> bool {
        if !self.reasons.insert(reason) {
            return false;
        }
        if self.reasons.len() == 1 {
            clock.pause();
            return true;
        }
        false
    }

    /// Returns the clock start result when this remove cleared the last reason.
    pub fn remove(
        &mut self,
        reason: FreezeReason,
        clock: &mut Clock,
        item: &StoryId,
    ) -> Option<ClockStart> {
        if !self.reasons.remove(&reason) || self.is_frozen() {
            return None;
        }
        Some(clock.start(item, clock.elapsed()))
    }

    /// Restarts the clock from zero for a newly current item. The clock only
    /// runs when nothing is holding it; otherwise the item waits at zero.
    pub fn enter_item(&self, clock: &mut Clock, item: &StoryId) -> Option<ClockStart> {
        clock.reset();
        if self.is_frozen() {
            return None;
        }
        Some(clock.start(item, Duration::ZERO))
    }
}
