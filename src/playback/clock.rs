use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::story::StoryId;

/// Messages posted by the clock's scheduled tasks. Both carry the item and
/// epoch captured when they were scheduled so the receiver can drop stale ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockEvent {
    Sample { item: StoryId, epoch: u64 },
    Complete { item: StoryId, epoch: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStart {
    Scheduled,
    /// The item had no time left; the caller completes it right away.
    Exhausted,
}

/// Pausable countdown for a single item.
///
/// `elapsed` only grows while running, and is folded from the running anchor
/// on every pause, so any number of pause/start cycles neither loses nor
/// double-counts time.
pub struct Clock {
    duration: Duration,
    sample_interval: Duration,
    /// Time accumulated from earlier running windows.
    elapsed: Duration,
    running_anchor: Option<Instant>,
    epoch: u64,
    completion: Option<JoinHandle<()>>,
    sampler: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<ClockEvent>,
}

impl Clock {
    pub fn new(
        duration: Duration,
        sample_interval: Duration,
        events: mpsc::UnboundedSender<ClockEvent>,
    ) -> Self {
        Self {
            duration,
            sample_interval,
            elapsed: Duration::ZERO,
            running_anchor: None,
            epoch: 0,
            completion: None,
            sampler: None,
            events,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_running(&self) -> bool {
        self.running_anchor.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.running_anchor {
            Some(anchor) => self.elapsed.saturating_add(anchor.elapsed()),
            None => self.elapsed,
        }
    }

    pub fn progress_fraction(&self) -> f64 {
        let fraction = self.elapsed().as_secs_f64() / self.duration.as_secs_f64();
        fraction.clamp(0.0, 1.0)
    }

    /// Begins running `item` from `from_elapsed`. The caller guarantees the
    /// clock is not already running.
    pub fn start(&mut self, item: &StoryId, from_elapsed: Duration) -> ClockStart {
        debug_assert!(!self.is_running(), "clock started twice");

        self.elapsed = from_elapsed;
        if from_elapsed >= self.duration {
            return ClockStart::Exhausted;
        }

        self.epoch = self.epoch.wrapping_add(1);
        let now = Instant::now();
        self.running_anchor = Some(now);

        let remaining = self.duration - from_elapsed;
        let epoch = self.epoch;

        let tx = self.events.clone();
        let completion_item = item.clone();
        self.completion = Some(tokio::spawn(async move {
            time::sleep_until(now + remaining).await;
            let _ = tx.send(ClockEvent::Complete {
                item: completion_item,
                epoch,
            });
        }));

        let tx = self.events.clone();
        let sample_item = item.clone();
        let sample_interval = self.sample_interval;
        self.sampler = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(now + sample_interval, sample_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let sample = ClockEvent::Sample {
                    item: sample_item.clone(),
                    epoch,
                };
                if tx.send(sample).is_err() {
                    break;
                }
            }
        }));

        ClockStart::Scheduled
    }

    /// Folds the running window into `elapsed` and cancels scheduled tasks.
    /// No-op when already paused.
    pub fn pause(&mut self) {
        let Some(anchor) = self.running_anchor.take() else {
            return;
        };
        self.elapsed = self.elapsed.saturating_add(anchor.elapsed());
        self.cancel_tasks();
    }

    pub fn reset(&mut self) {
        self.running_anchor = None;
        self.elapsed = Duration::ZERO;
        self.cancel_tasks();
    }

    /// Stops at exactly the full duration once the item has completed.
    pub fn finish(&mut self) {
        self.running_anchor = None;
        self.elapsed = self.duration;
        self.cancel_tasks();
    }

    /// Whether a message scheduled for `item` at `epoch` still belongs to the
    /// current running window.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.is_running() && epoch == self.epoch
    }

    fn cancel_tasks(&mut self) {
        // Anything already queued by the aborted tasks fails `is_current`.
        self.epoch = self.epoch.wrapping_add(1);
        if let Some(handle) = self.completion.take() {
            handle.abort();
        }
        if let Some(handle) = self.sampler.take() {
            handle.abort();
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.cancel_tasks();
    }
}
