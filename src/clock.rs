//! Logical clock supplied by the host.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use time::OffsetDateTime;

use crate::types::Timestamp;

/// Source of the timestamps stamped onto batches and log entries.
///
/// Implementations must be monotonically non-decreasing.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Unix seconds from the system clock, clamped so it never goes backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0);
        let prev = self.last.fetch_max(wall, Ordering::Relaxed);
        prev.max(wall)
    }
}

/// Externally driven clock, e.g. a block height fed in by the host.
#[derive(Debug, Default)]
pub struct ManualClock {
    value: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            value: AtomicU64::new(start),
        }
    }

    /// Move the clock to `to`; earlier values are ignored.
    pub fn set(&self, to: Timestamp) {
        self.value.fetch_max(to, Ordering::Relaxed);
    }

    pub fn advance(&self, by: Timestamp) {
        self.value.fetch_add(by, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.value.load(Ordering::Relaxed)
    }
}
