use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;

/// Source of "now" for message and personal message timestamps.
pub trait Clock: Send + Sync {
    /// Current time in unix microseconds.
    fn now(&self) -> i64;
}

#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as i64
    }
}

/// Clock that only moves when told to. Used by tests and fixtures that need
/// exact or backdated timestamps.
#[derive(Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self(AtomicI64::new(start))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: i64) -> i64 {
        self.0.fetch_add(by, Ordering::SeqCst) + by
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
