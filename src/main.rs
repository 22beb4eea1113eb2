use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use story_player::{
    init_logging, MemoryStore, PlayerEvent, PlayerSettings, StoryGroup, StoryPlayer, UserId,
};

/// Plays a story group from a JSON file against the in-memory store.
///
/// Usage: `story-player <group.json> [viewer-id] [settings.json]`
#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let Some(group_path) = args.next().map(PathBuf::from) else {
        bail!("usage: story-player <group.json> [viewer-id] [settings.json]");
    };
    let viewer = UserId::new(args.next().unwrap_or_else(|| "demo-viewer".into()));
    let settings = match args.next() {
        Some(path) => PlayerSettings::load(&PathBuf::from(path))?,
        None => PlayerSettings::default(),
    };

    let contents = std::fs::read_to_string(&group_path)
        .with_context(|| format!("Failed to read story group from {}", group_path.display()))?;
    let group: StoryGroup = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid story group in {}", group_path.display()))?;

    if group.is_empty() {
        warn!("{} has no stories to play", group.author_display_name);
    }

    info!(
        "Playing {} stories by {} as {}",
        group.len(),
        group.author_display_name,
        viewer
    );

    let store = Arc::new(MemoryStore::with_group(&group));
    let (player, mut events) = StoryPlayer::open(group, viewer, store.clone(), settings)?;

    while let Some(event) = events.recv().await {
        match &event {
            PlayerEvent::Advanced { to, .. } | PlayerEvent::Retreated { to, .. } => {
                let snapshot = player.snapshot();
                info!(
                    "Now showing {}/{}: {}",
                    to + 1,
                    snapshot.item_count,
                    snapshot
                        .current_item
                        .as_ref()
                        .and_then(|item| item.caption.clone())
                        .unwrap_or_default()
                );
            }
            PlayerEvent::ReplyFailed => warn!("Reply failed"),
            _ => info!("{}", serde_json::to_string(&event)?),
        }
        if let PlayerEvent::Closed { .. } = event {
            break;
        }
    }

    Ok(())
}
