pub mod backend;
pub mod playback;
pub mod settings;
pub mod story;
mod utils;

pub use backend::{MemoryStore, StoryBackend, Subscription, SubscriptionFeed};
pub use playback::{
    CloseReason, Feedback, FreezeReason, PlaybackSnapshot, PlaybackStatus, PlayerEvent,
    ReplyStatus, SegmentState, StoryPlayer, TapRegion,
};
pub use settings::PlayerSettings;
pub use story::{StoryGroup, StoryId, StoryItem, UserId};
pub use utils::logging::init_logging;
