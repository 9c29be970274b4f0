//! 💓 The heartbeat. Every so often it says how long the run has been going. That's it.
//! It cannot stop a job, start a job, or change anything. It is a clock with opinions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

use super::workers::Worker;
use crate::summary::format_duration;

#[derive(Debug)]
pub(crate) struct Heartbeat {
    interval: Duration,
    started: Instant,
    beats: Arc<AtomicU64>,
}

impl Heartbeat {
    pub(crate) fn new(interval: Duration, started: Instant) -> Self {
        Self {
            interval,
            started,
            beats: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 🔢 How many times it has beaten so far. Shared with the running task.
    #[cfg(test)]
    pub(crate) fn beats(&self) -> Arc<AtomicU64> {
        self.beats.clone()
    }
}

impl Worker for Heartbeat {
    type Output = ();

    fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.interval.is_zero() {
                return;
            }
            let mut the_ticker = tokio::time::interval_at(self.started + self.interval, self.interval);
            the_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                the_ticker.tick().await;
                self.beats.fetch_add(1, Ordering::Relaxed);
                info!("💓 still zipping, {} elapsed", format_duration(self.started.elapsed()));
            }
        })
    }
}
