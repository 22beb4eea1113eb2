use serde::Serialize;

use super::effects::{Feedback, ReplyStatus};
use super::interruption::FreezeReason;
use crate::story::{StoryItem, UserId};

/// Per-item lifecycle. `Completed` is only reached from `Running`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Closed,
}

/// State of one segment in the progress-bar row.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SegmentState {
    Complete,
    Active,
    Pending,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CloseReason {
    /// Played or stepped past the last item.
    Finished,
    /// The host closed the viewer.
    Dismissed,
    /// Nothing left to play once expired items were dropped.
    Empty,
}

/// Events delivered to the host in the order they happened.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PlayerEvent {
    Advanced { from: usize, to: usize },
    Retreated { from: usize, to: usize },
    Closed { reason: CloseReason },
    ReplySent,
    ReplyFailed,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TapRegion {
    Back,
    Forward,
}

/// Everything the host needs to render the viewer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub session_id: String,
    pub author_id: UserId,
    pub author_display_name: String,
    pub author_avatar_ref: Option<String>,
    pub status: PlaybackStatus,
    pub current_index: usize,
    pub item_count: usize,
    pub current_item: Option<StoryItem>,
    pub elapsed_ms: u64,
    pub progress_fraction: f64,
    pub segments: Vec<SegmentState>,
    pub freeze_reasons: Vec<FreezeReason>,
    pub liked_by_viewer: bool,
    pub feedback: Option<Feedback>,
    pub reply_status: ReplyStatus,
    pub draft: String,
}

impl PlaybackSnapshot {
    pub fn is_closed(&self) -> bool {
        self.status == PlaybackStatus::Closed
    }
}

pub fn segment_states(item_count: usize, current_index: usize) -> Vec<SegmentState> {
    (0..item_count)
        .map(|index| match index.cmp(&current_index) {
            std::cmp::Ordering::Less => SegmentState::Complete,
            std::cmp::Ordering::Equal => SegmentState::Active,
            std::cmp::Ordering::Greater => SegmentState::Pending,
        })
        .collect()
}
