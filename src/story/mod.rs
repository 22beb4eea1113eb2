pub mod model;

pub use model::{StoryGroup, StoryId, StoryItem, UserId};
