//! Queue policies and the bookkeeping behind `drain_all`

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// What `enqueue_speak` does when a bounded synthesis queue is full
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait for room. `enqueue_speak` becomes blocking.
    #[default]
    Block,

    /// Discard the oldest queued utterance to make room
    DropOldest,

    /// Refuse the new utterance with `QueueFull`
    Reject,
}

/// Capacity and overflow behaviour of the synthesis queue
///
/// The default is unbounded: every response is kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuePolicy {
    /// Maximum queued utterances; `None` means unbounded
    pub capacity: Option<usize>,

    /// Ignored when unbounded
    pub overflow: OverflowPolicy,
}

impl QueuePolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity),
            overflow,
        }
    }
}

/// Create a channel for the given capacity (`None` = unbounded)
pub(crate) fn channel<T>(capacity: Option<usize>) -> (Sender<T>, Receiver<T>) {
    match capacity {
        Some(n) => bounded(n.max(1)),
        None => unbounded(),
    }
}

/// Push onto a bounded channel, evicting the oldest items while it is full
///
/// A full channel is retried once before anything is evicted, since the
/// consumer may free a slot between attempts. Returns the evicted items, or
/// the item back if the channel is disconnected.
pub(crate) fn push_dropping_oldest<T>(
    tx: &Sender<T>,
    rx: &Receiver<T>,
    item: T,
) -> std::result::Result<Vec<T>, T> {
    let mut item = item;
    let mut evicted = Vec::new();
    let mut retried = false;

    loop {
        match tx.try_send(item) {
            Ok(()) => return Ok(evicted),
            Err(TrySendError::Disconnected(returned)) => return Err(returned),
            Err(TrySendError::Full(returned)) => {
                item = returned;
                if !retried {
                    retried = true;
                    continue;
                }
                retried = false;
                if let Ok(oldest) = rx.try_recv() {
                    evicted.push(oldest);
                }
            }
        }
    }
}

/// Counts utterances from enqueue until they are fully played or dropped
///
/// The count covers both queues and whatever either worker is holding, so
/// reaching zero means nothing is queued and nothing is mid-processing.
#[derive(Debug, Default)]
pub(crate) struct WorkTracker {
    in_flight: Mutex<usize>,
    idle: Condvar,
}

impl WorkTracker {
    pub fn begin(&self) {
        *self.in_flight.lock() += 1;
    }

    pub fn finish(&self) {
        let mut count = self.in_flight.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub fn pending(&self) -> usize {
        *self.in_flight.lock()
    }

    pub fn wait_idle(&self) {
        let mut count = self.in_flight.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }

    /// Returns `true` if the tracker went idle before `timeout`
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.lock();
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

/// Point-in-time pipeline counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Utterances accepted by `enqueue_speak`
    pub enqueued: u64,
    /// Assets produced by the synthesis stage
    pub synthesized: u64,
    /// Utterances dropped because synthesis failed
    pub synthesis_failures: u64,
    /// Assets played to completion
    pub played: u64,
    /// Assets whose playback failed
    pub playback_failures: u64,
    /// Assets whose backing resource was freed
    pub released: u64,
    /// Utterances discarded by the `DropOldest` overflow policy
    pub dropped_by_policy: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub enqueued: AtomicU64,
    pub synthesized: AtomicU64,
    pub synthesis_failures: AtomicU64,
    pub played: AtomicU64,
    pub playback_failures: AtomicU64,
    pub released: AtomicU64,
    pub dropped_by_policy: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            synthesized: self.synthesized.load(Ordering::Relaxed),
            synthesis_failures: self.synthesis_failures.load(Ordering::Relaxed),
            played: self.played.load(Ordering::Relaxed),
            playback_failures: self.playback_failures.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            dropped_by_policy: self.dropped_by_policy.load(Ordering::Relaxed),
        }
    }
}
