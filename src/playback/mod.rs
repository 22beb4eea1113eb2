pub mod clock;
pub mod effects;
pub mod engine;
pub mod interruption;
pub mod live;
pub mod sequencer;
pub mod state;

pub use effects::{Feedback, ReplyStatus};
pub use engine::StoryPlayer;
pub use interruption::FreezeReason;
pub use state::{
    CloseReason, PlaybackSnapshot, PlaybackStatus, PlayerEvent, SegmentState, TapRegion,
};
