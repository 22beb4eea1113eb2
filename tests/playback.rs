use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use story_player::{
    CloseReason, Feedback, FreezeReason, MemoryStore, PlaybackStatus, PlayerEvent,
    PlayerSettings, ReplyStatus, SegmentState, StoryGroup, StoryId, StoryItem, StoryPlayer,
    TapRegion, UserId,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn viewer() -> UserId {
    UserId::new("guest")
}

fn group(count: usize) -> StoryGroup {
    let now = Utc::now();
    StoryGroup {
        author_id: UserId::new("bistro"),
        author_display_name: "Bistro Nord".into(),
        author_avatar_ref: Some("avatars/bistro.png".into()),
        items: (0..count)
            .map(|i| StoryItem {
                id: StoryId::new(format!("s{i}")),
                media_ref: Some(format!("media/s{i}.jpg")),
                caption: Some(format!("Course {i}")),
                created_at: now - chrono::Duration::minutes(60 - i as i64),
                expires_at: now + chrono::Duration::hours(23),
                viewer_ids: Default::default(),
                liker_ids: Default::default(),
            })
            .collect(),
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn run_for(duration: Duration) {
    time::advance(duration).await;
    settle().await;
}

fn drain(events: &mut UnboundedReceiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn open(
    count: usize,
) -> (
    StoryPlayer,
    UnboundedReceiver<PlayerEvent>,
    Arc<MemoryStore>,
) {
    let group = group(count);
    let store = Arc::new(MemoryStore::with_group(&group));
    let (player, events) =
        StoryPlayer::open(group, viewer(), store.clone(), PlayerSettings::default()).unwrap();
    (player, events, store)
}

#[tokio::test(start_paused = true)]
async fn manual_pause_keeps_elapsed_and_auto_advances_at_full_duration() {
    let (player, mut events, _store) = open(3);
    let snapshot = player.refresh().await.unwrap();
    assert_eq!(snapshot.status, PlaybackStatus::Running);
    assert_eq!(snapshot.current_index, 0);

    run_for(ms(2000)).await;
    let paused = player.pause_manual().await.unwrap();
    assert_eq!(paused.elapsed_ms, 2000);
    assert_eq!(paused.status, PlaybackStatus::Paused);

    run_for(ms(3000)).await;
    let resumed = player.resume_manual().await.unwrap();
    assert_eq!(resumed.elapsed_ms, 2000);
    assert_eq!(resumed.status, PlaybackStatus::Running);

    run_for(ms(1000)).await;
    assert_eq!(player.refresh().await.unwrap().elapsed_ms, 3000);
    assert!(drain(&mut events).is_empty());

    run_for(ms(2000)).await;
    let next = player.refresh().await.unwrap();
    assert_eq!(next.current_index, 1);
    assert_eq!(next.elapsed_ms, 0);
    assert_eq!(next.status, PlaybackStatus::Running);
    assert_eq!(drain(&mut events), vec![PlayerEvent::Advanced { from: 0, to: 1 }]);
}

#[tokio::test(start_paused = true)]
async fn completing_last_item_closes_session() {
    let (player, mut events, store) = open(3);
    player.jump_to(2).await.unwrap();
    drain(&mut events);

    run_for(ms(5000)).await;

    assert_eq!(
        drain(&mut events),
        vec![PlayerEvent::Closed {
            reason: CloseReason::Finished
        }]
    );
    assert!(player.snapshot().is_closed());
    assert!(player.refresh().await.is_err());
    assert_eq!(store.subscriber_count(&StoryId::new("s2")), 0);
}

#[tokio::test(start_paused = true)]
async fn pause_at_full_duration_then_resume_moves_on() {
    let (player, mut events, _store) = open(3);
    player.refresh().await.unwrap();

    // The completion message and the pause request race here; either way the
    // resumed session must be on the next item from zero.
    time::advance(ms(5000)).await;
    player.pause_manual().await.unwrap();
    settle().await;

    let resumed = player.resume_manual().await.unwrap();
    assert_eq!(resumed.current_index, 1);
    assert_eq!(resumed.elapsed_ms, 0);
    assert_eq!(resumed.status, PlaybackStatus::Running);
    assert_eq!(drain(&mut events), vec![PlayerEvent::Advanced { from: 0, to: 1 }]);
}

#[tokio::test(start_paused = true)]
async fn reply_outcome_is_cleared_when_moving_on() {
    let (player, _events, store) = open(3);
    store.set_fail_replies(true);

    player.reply("still serving brunch?").await.unwrap();
    settle().await;
    assert_eq!(
        player.refresh().await.unwrap().reply_status,
        ReplyStatus::Failed
    );

    let moved = player.advance().await.unwrap();
    assert_eq!(moved.reply_status, ReplyStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn navigation_restarts_target_from_zero() {
    let (player, mut events, _store) = open(3);

    run_for(ms(1500)).await;
    player.advance().await.unwrap();
    run_for(ms(700)).await;
    let back = player.retreat().await.unwrap();

    assert_eq!(back.current_index, 0);
    assert_eq!(back.elapsed_ms, 0);
    assert_eq!(
        drain(&mut events),
        vec![
            PlayerEvent::Advanced { from: 0, to: 1 },
            PlayerEvent::Retreated { from: 1, to: 0 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn retreat_at_first_item_is_noop() {
    let (player, mut events, _store) = open(2);
    run_for(ms(400)).await;

    let snapshot = player.retreat().await.unwrap();
    assert_eq!(snapshot.current_index, 0);
    assert_eq!(snapshot.elapsed_ms, 400);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn manual_advance_past_last_item_closes() {
    let (player, mut events, _store) = open(1);
    let snapshot = player.advance().await.unwrap();

    assert!(snapshot.is_closed());
    assert_eq!(
        drain(&mut events),
        vec![PlayerEvent::Closed {
            reason: CloseReason::Finished
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn overlapping_freezes_resume_only_when_all_clear() {
    let (player, _events, _store) = open(3);
    run_for(ms(1000)).await;

    player.pause_manual().await.unwrap();
    player.set_input_focused(true).await.unwrap();
    let still = player.resume_manual().await.unwrap();
    assert_eq!(still.status, PlaybackStatus::Paused);
    assert_eq!(still.freeze_reasons, vec![FreezeReason::InputFocus]);

    run_for(ms(10_000)).await;
    let snapshot = player.refresh().await.unwrap();
    assert_eq!(snapshot.current_index, 0);
    assert_eq!(snapshot.elapsed_ms, 1000);

    let running = player.set_input_focused(false).await.unwrap();
    assert_eq!(running.status, PlaybackStatus::Running);
    assert!(running.freeze_reasons.is_empty());
}

#[tokio::test(start_paused = true)]
async fn manual_pause_survives_navigation() {
    let (player, _events, _store) = open(3);
    player.pause_manual().await.unwrap();

    let moved = player.advance().await.unwrap();
    assert_eq!(moved.current_index, 1);
    assert_eq!(moved.status, PlaybackStatus::Paused);
    assert_eq!(moved.freeze_reasons, vec![FreezeReason::Manual]);

    run_for(ms(8000)).await;
    assert_eq!(player.refresh().await.unwrap().elapsed_ms, 0);
}

#[tokio::test(start_paused = true)]
async fn taps_are_ignored_while_typing() {
    let (player, mut events, _store) = open(3);
    player.set_input_focused(true).await.unwrap();

    let snapshot = player.tap(TapRegion::Forward).await.unwrap();
    assert_eq!(snapshot.current_index, 0);

    player.set_input_focused(false).await.unwrap();
    let snapshot = player.tap(TapRegion::Forward).await.unwrap();
    assert_eq!(snapshot.current_index, 1);
    assert_eq!(
        snapshot.segments,
        vec![
            SegmentState::Complete,
            SegmentState::Active,
            SegmentState::Pending
        ]
    );
    assert_eq!(drain(&mut events), vec![PlayerEvent::Advanced { from: 0, to: 1 }]);
}

#[tokio::test(start_paused = true)]
async fn each_item_is_marked_viewed_once_per_session() {
    let (player, _events, store) = open(3);
    settle().await;

    player.advance().await.unwrap();
    player.retreat().await.unwrap();
    player.advance().await.unwrap();
    player.jump_to(0).await.unwrap();
    settle().await;

    assert_eq!(store.mark_viewed_calls(&StoryId::new("s0")), 1);
    assert_eq!(store.mark_viewed_calls(&StoryId::new("s1")), 1);
    assert_eq!(store.mark_viewed_calls(&StoryId::new("s2")), 0);
    assert!(store
        .item(&StoryId::new("s1"))
        .unwrap()
        .is_viewed_by(&viewer()));
}

#[tokio::test(start_paused = true)]
async fn live_updates_patch_current_item_without_touching_clock() {
    let (player, _events, store) = open(3);
    settle().await;
    run_for(ms(1200)).await;

    store
        .update(&StoryId::new("s0"), |item| {
            item.liker_ids.insert(UserId::new("friend"));
            item.caption = Some("Course 0, now with truffles".into());
        })
        .unwrap();
    settle().await;

    let snapshot = player.refresh().await.unwrap();
    let item = snapshot.current_item.unwrap();
    assert!(item.is_liked_by(&UserId::new("friend")));
    assert!(item.is_viewed_by(&viewer()));
    assert_eq!(item.caption.as_deref(), Some("Course 0, now with truffles"));
    assert_eq!(snapshot.elapsed_ms, 1200);
    assert_eq!(snapshot.status, PlaybackStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn updates_for_previous_item_are_ignored() {
    let (player, _events, store) = open(3);
    settle().await;
    player.advance().await.unwrap();
    settle().await;
    run_for(ms(300)).await;

    store
        .update(&StoryId::new("s0"), |item| {
            item.liker_ids.insert(UserId::new("friend"));
        })
        .unwrap();
    settle().await;

    let snapshot = player.refresh().await.unwrap();
    assert_eq!(snapshot.current_index, 1);
    assert_eq!(snapshot.elapsed_ms, 300);
    assert_eq!(store.subscriber_count(&StoryId::new("s0")), 0);
    assert_eq!(store.subscriber_count(&StoryId::new("s1")), 1);
}

#[tokio::test(start_paused = true)]
async fn subscription_failure_does_not_stop_playback() {
    let group = group(2);
    let store = Arc::new(MemoryStore::with_group(&group));
    store.set_fail_subscriptions(true);
    let (player, mut events) =
        StoryPlayer::open(group, viewer(), store, PlayerSettings::default()).unwrap();

    run_for(ms(5000)).await;
    assert_eq!(player.refresh().await.unwrap().current_index, 1);
    assert_eq!(drain(&mut events), vec![PlayerEvent::Advanced { from: 0, to: 1 }]);
}

#[tokio::test(start_paused = true)]
async fn react_while_typing_only_toggles_reaction() {
    let (player, _events, store) = open(3);
    player.set_input_focused(true).await.unwrap();
    player.set_draft("see you at eight").await.unwrap();

    let snapshot = player.react("❤").await.unwrap();
    settle().await;

    assert!(snapshot.liked_by_viewer);
    assert_eq!(
        snapshot.feedback,
        Some(Feedback::Reaction { glyph: "❤".into() })
    );
    assert_eq!(store.reaction_calls(), 1);
    assert!(store.sent_replies().is_empty());
    assert_eq!(snapshot.draft, "see you at eight");
    assert!(store
        .item(&StoryId::new("s0"))
        .unwrap()
        .is_liked_by(&viewer()));
}

#[tokio::test(start_paused = true)]
async fn reaction_feedback_holds_playback_for_window() {
    let (player, _events, _store) = open(3);
    run_for(ms(1000)).await;

    let held = player.react("❤").await.unwrap();
    assert_eq!(held.freeze_reasons, vec![FreezeReason::FeedbackAnimation]);

    run_for(ms(1499)).await;
    assert_eq!(player.refresh().await.unwrap().status, PlaybackStatus::Paused);

    run_for(ms(1)).await;
    let resumed = player.refresh().await.unwrap();
    assert_eq!(resumed.status, PlaybackStatus::Running);
    assert_eq!(resumed.elapsed_ms, 1000);
    assert!(resumed.feedback.is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_reaction_reverts_on_next_reconciliation() {
    let (player, _events, store) = open(2);
    store.set_fail_reactions(true);
    settle().await;

    assert!(player.react("❤").await.unwrap().liked_by_viewer);
    settle().await;

    store
        .update(&StoryId::new("s0"), |item| {
            item.caption = Some("refreshed".into());
        })
        .unwrap();
    settle().await;

    assert!(!player.refresh().await.unwrap().liked_by_viewer);
}

#[tokio::test(start_paused = true)]
async fn reply_holds_until_sent_then_for_confirmation_window() {
    let (player, mut events, store) = open(3);
    store.set_reply_latency(ms(400));
    run_for(ms(500)).await;

    player.set_draft("Table for two?").await.unwrap();
    let sending = player.reply("Table for two?").await.unwrap();
    assert_eq!(sending.reply_status, ReplyStatus::Sending);
    assert_eq!(sending.status, PlaybackStatus::Paused);

    run_for(ms(400)).await;
    let sent = player.refresh().await.unwrap();
    assert_eq!(sent.reply_status, ReplyStatus::Sent);
    assert_eq!(sent.draft, "");
    assert_eq!(sent.feedback, Some(Feedback::ReplySent));
    assert_eq!(sent.status, PlaybackStatus::Paused);
    assert_eq!(drain(&mut events), vec![PlayerEvent::ReplySent]);

    run_for(ms(1500)).await;
    let resumed = player.refresh().await.unwrap();
    assert_eq!(resumed.status, PlaybackStatus::Running);
    assert_eq!(resumed.elapsed_ms, 500);

    let replies = store.sent_replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].target_author_id, UserId::new("bistro"));
    assert_eq!(replies[0].text, "Table for two?");
}

#[tokio::test(start_paused = true)]
async fn failed_reply_resumes_immediately() {
    let (player, mut events, store) = open(3);
    store.set_fail_replies(true);
    player.set_draft("are you open late").await.unwrap();

    player.reply("are you open late").await.unwrap();
    settle().await;

    let snapshot = player.refresh().await.unwrap();
    assert_eq!(snapshot.status, PlaybackStatus::Running);
    assert_eq!(snapshot.reply_status, ReplyStatus::Failed);
    assert_eq!(snapshot.draft, "are you open late");
    assert!(snapshot.feedback.is_none());
    assert_eq!(drain(&mut events), vec![PlayerEvent::ReplyFailed]);
}

#[tokio::test(start_paused = true)]
async fn reply_freeze_stacks_with_input_focus() {
    let (player, _events, store) = open(3);
    player.set_input_focused(true).await.unwrap();
    player.reply("👏").await.unwrap();
    settle().await;
    run_for(ms(1500)).await;

    let snapshot = player.refresh().await.unwrap();
    assert_eq!(snapshot.status, PlaybackStatus::Paused);
    assert_eq!(snapshot.freeze_reasons, vec![FreezeReason::InputFocus]);
    assert_eq!(store.sent_replies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_tears_everything_down() {
    let (player, mut events, store) = open(3);
    settle().await;
    assert_eq!(store.subscriber_count(&StoryId::new("s0")), 1);

    let closed = player.close().await.unwrap();
    assert!(closed.is_closed());
    settle().await;

    assert_eq!(store.subscriber_count(&StoryId::new("s0")), 0);
    run_for(ms(20_000)).await;
    assert_eq!(
        drain(&mut events),
        vec![PlayerEvent::Closed {
            reason: CloseReason::Dismissed
        }]
    );
    assert!(player.advance().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_closes_session() {
    let (player, mut events, store) = open(2);
    settle().await;
    drop(player);
    settle().await;

    assert_eq!(
        drain(&mut events),
        vec![PlayerEvent::Closed {
            reason: CloseReason::Dismissed
        }]
    );
    assert_eq!(store.subscriber_count(&StoryId::new("s0")), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_items_are_skipped_and_empty_groups_close() {
    let mut stale = group(2);
    for item in &mut stale.items {
        item.expires_at = Utc::now() - chrono::Duration::minutes(1);
    }
    let store = Arc::new(MemoryStore::with_group(&stale));
    let (player, mut events) =
        StoryPlayer::open(stale, viewer(), store.clone(), PlayerSettings::default()).unwrap();

    assert!(player.snapshot().is_closed());
    assert_eq!(
        drain(&mut events),
        vec![PlayerEvent::Closed {
            reason: CloseReason::Empty
        }]
    );
    assert!(player.advance().await.is_err());

    let mut mixed = group(3);
    mixed.items[0].expires_at = Utc::now() - chrono::Duration::minutes(1);
    let (player, _events) =
        StoryPlayer::open(mixed, viewer(), store, PlayerSettings::default()).unwrap();
    let snapshot = player.snapshot();
    assert_eq!(snapshot.item_count, 2);
    assert_eq!(
        snapshot.current_item.map(|item| item.id),
        Some(StoryId::new("s1"))
    );
}

#[tokio::test(start_paused = true)]
async fn progress_is_published_on_watch_channel() {
    let (player, _events, _store) = open(2);
    let mut watch = player.watch();
    let _ = watch.borrow_and_update();

    run_for(ms(2500)).await;
    assert!(watch.has_changed().unwrap());
    let fraction = watch.borrow_and_update().progress_fraction;
    assert!((fraction - 0.5).abs() < 0.02, "fraction was {fraction}");
}

#[tokio::test(start_paused = true)]
async fn invalid_settings_are_rejected() {
    let settings = PlayerSettings {
        sample_interval_ms: 0,
        ..PlayerSettings::default()
    };
    let store = Arc::new(MemoryStore::new());
    assert!(StoryPlayer::open(group(1), viewer(), store, settings).is_err());
}
