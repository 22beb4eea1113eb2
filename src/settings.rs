use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

/// Timing knobs for a viewing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerSettings {
    /// Fixed time each item stays on screen.
    pub item_duration_ms: u64,
    /// How often progress is sampled for the bar.
    pub sample_interval_ms: u64,
    /// How long reaction/reply confirmation holds playback.
    pub feedback_window_ms: u64,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            item_duration_ms: 5_000,
            sample_interval_ms: 50,
            feedback_window_ms: 1_500,
        }
    }
}

impl PlayerSettings {
    /// Reads settings from a JSON file. A missing file gives defaults; a file
    /// that does not parse is logged and replaced by defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read player settings from {}", path.display()))?;

        let settings = serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!(
                "Ignoring malformed player settings at {}: {err}",
                path.display()
            );
            Self::default()
        });
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.item_duration_ms == 0 {
            bail!("item_duration_ms must be greater than zero");
        }
        if self.sample_interval_ms == 0 {
            bail!("sample_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn item_duration(&self) -> Duration {
        Duration::from_millis(self.item_duration_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn feedback_window(&self) -> Duration {
        Duration::from_millis(self.feedback_window_ms)
    }
}

/// `STORY_PLAYER_DEBUG=1` (or `true`) turns on per-sample progress logging.
pub fn debug_enabled() -> bool {
    std::env::var("STORY_PLAYER_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
