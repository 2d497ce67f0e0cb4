//! Coarse time source for item timestamps.
//!
//! Item timestamps are seconds relative to cache start, which keeps them in
//! a `u32` and makes "age" a plain subtraction.

use std::sync::atomic::{AtomicU32, Ordering};

/// Source of coarse, monotonic-enough time for the cache.
pub trait Clock: Send + Sync {
    /// Seconds since the cache started.
    fn now(&self) -> u32;

    /// Unix time, in seconds, at which the cache started.
    fn started(&self) -> u64;
}

/// Current unix time in whole seconds.
#[inline]
fn unix_secs() -> u64 {
    clocksource::coarse::UnixInstant::now()
        .duration_since(clocksource::coarse::UnixInstant::EPOCH)
        .as_secs() as u64
}

/// Seconds from `started` to `now`, clamped to the `u32` range.
#[inline]
fn secs_since(started: u64, now: u64) -> u32 {
    u32::try_from(now.saturating_sub(started)).unwrap_or(u32::MAX)
}

/// Wall clock backed by `clocksource`'s coarse clock.
#[derive(Debug)]
pub struct CoarseClock {
    started: u64,
}

impl CoarseClock {
    /// Create a clock whose epoch is the current time.
    pub fn new() -> Self {
        Self {
            started: unix_secs(),
        }
    }
}

impl Default for CoarseClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for CoarseClock {
    #[inline]
    fn now(&self) -> u32 {
        secs_since(self.started, unix_secs())
    }

    fn started(&self) -> u64 {
        self.started
    }
}

/// Manually driven clock for deterministic tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
    started: u64,
}

impl ManualClock {
    /// Create a clock reading `now` seconds since start.
    pub fn new(now: u32) -> Self {
        Self {
            now: AtomicU32::new(now),
            started: 0,
        }
    }

    /// Set the current time.
    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::Relaxed);
    }

    /// Move the clock forward.
    pub fn advance(&self, secs: u32) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }

    fn started(&self) -> u64 {
        self.started
    }
}
