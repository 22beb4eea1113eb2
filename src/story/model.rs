use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryId(pub String);

impl StoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ephemeral post. Items without `media_ref` render as text on a background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryItem {
    pub id: StoryId,
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub viewer_ids: BTreeSet<UserId>,
    #[serde(default)]
    pub liker_ids: BTreeSet<UserId>,
}

impl StoryItem {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_text_only(&self) -> bool {
        self.media_ref.is_none()
    }

    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.liker_ids.contains(user)
    }

    pub fn is_viewed_by(&self, user: &UserId) -> bool {
        self.viewer_ids.contains(user)
    }
}

/// One author's stories, oldest first. The unit of navigation for a viewing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryGroup {
    pub author_id: UserId,
    pub author_display_name: String,
    #[serde(default)]
    pub author_avatar_ref: Option<String>,
    pub items: Vec<StoryItem>,
}

impl StoryGroup {
    /// Drops items that have already expired at `now`, keeping chronological order.
    pub fn playable(mut self, now: DateTime<Utc>) -> Self {
        self.items.retain(|item| !item.is_expired(now));
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
