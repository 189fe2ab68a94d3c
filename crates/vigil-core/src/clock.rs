//! Time sources
//!
//! The state machines never sleep. They read the clock at call time and
//! compare against recorded instants: the timelock uses [`Clock::now`], the
//! rate limit uses whichever reading the policy selects.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::policy::RateLimitBasis;

/// Source of the current time
pub trait Clock: Send + Sync + core::fmt::Debug {
    /// Current time in seconds
    fn now(&self) -> u64;

    /// Current producer-controlled height (e.g. block number)
    fn height(&self) -> u64;

    /// Reading used by the rate limit
    fn reading(&self, basis: RateLimitBasis) -> u64 {
        match basis {
            RateLimitBasis::Height => self.height(),
            RateLimitBasis::WallClock => self.now(),
        }
    }
}

/// Wall clock; height advances with seconds
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }

    fn height(&self) -> u64 {
        self.now()
    }
}

/// Manually driven clock for tests and scenario runs
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicU64,
    height: AtomicU64,
}

impl ManualClock {
    pub fn new(secs: u64, height: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
            height: AtomicU64::new(height),
        }
    }

    /// Move wall-clock time forward
    pub fn advance_secs(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Produce `blocks` more units of height
    pub fn advance_height(&self, blocks: u64) {
        self.height.fetch_add(blocks, Ordering::SeqCst);
    }

    /// Advance both readings, as producing one block of `secs` seconds would
    pub fn tick(&self, secs: u64) {
        self.advance_secs(secs);
        self.advance_height(1);
    }

    pub fn set(&self, secs: u64, height: u64) {
        self.secs.store(secs, Ordering::SeqCst);
        self.height.store(height, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }

    fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000, 10);
        clock.tick(12);
        assert_eq!(clock.now(), 1_012);
        assert_eq!(clock.height(), 11);

        clock.advance_secs(88);
        assert_eq!(clock.reading(RateLimitBasis::WallClock), 1_100);
        assert_eq!(clock.reading(RateLimitBasis::Height), 11);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
