// SPDX-License-Identifier: MIT OR Apache-2.0
//! Time sources.

use cueplay_timeline::Time;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time in epoch milliseconds
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> Time;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Time {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Time
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    /// Start at `time`
    pub fn new(time: Time) -> Self {
        Self(Arc::new(AtomicI64::new(time)))
    }

    /// Jump to `time`
    pub fn set(&self, time: Time) {
        self.0.store(time, Ordering::SeqCst);
    }

    /// Move forward by `delta`
    pub fn advance(&self, delta: Time) {
        self.0.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Time {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(1000);
        let other = clock.clone();
        clock.advance(500);
        assert_eq!(other.now(), 1500);
        other.set(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn test_system_clock_is_epoch_millis() {
        // 2020-01-01
        assert!(SystemClock.now() > 1_577_836_800_000);
    }
}
