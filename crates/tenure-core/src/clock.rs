use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::types::Millis;

/// Wall-clock source in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Millis;
}

/// Reads `time::OffsetDateTime::now_utc()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
        (nanos / 1_000_000) as Millis
    }
}

/// Settable clock (for testing).
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: Millis) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Millis) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

/// Hands out strictly increasing session stamps from a clock.
///
/// Every stamp is `max(now, previous + 1)`, so a wall clock that steps
/// backwards or two acquisitions within the same millisecond still yield
/// distinct, ordered `sessionStartedAt` values.
pub struct MonotonicStamper {
    clock: Arc<dyn Clock>,
    last: AtomicI64,
}

impl MonotonicStamper {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicI64::new(Millis::MIN),
        }
    }

    pub fn next_stamp(&self) -> Millis {
        let now = self.clock.now_ms();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = if prev == Millis::MIN {
                now
            } else {
                now.max(prev.saturating_add(1))
            };
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}
