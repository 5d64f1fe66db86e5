use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Point in session time as seen by the core.
///
/// Scheduling uses the monotonic part only; the wall-clock part is what
/// ends up in command records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    pub monotonic_us: u64,
    pub unix_ms: u64,
}

impl Timestamp {
    /// Test helper: a monotonic instant with a matching fake wall clock.
    pub fn at_ms(ms: u64) -> Self {
        Self {
            monotonic_us: ms * 1_000,
            unix_ms: 1_700_000_000_000 + ms,
        }
    }

    pub fn plus_ms(self, ms: f64) -> Self {
        let delta_us = (ms * 1_000.0).round().max(0.0) as u64;
        Self {
            monotonic_us: self.monotonic_us + delta_us,
            unix_ms: self.unix_ms + delta_us / 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Wall-clock milliseconds since Unix epoch.
    pub fn unix_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    pub fn stamp(&self) -> Timestamp {
        Timestamp {
            monotonic_us: self.now_us(),
            unix_ms: self.unix_ms(),
        }
    }

    /// Instant corresponding to a monotonic offset.
    pub fn instant_at(&self, monotonic_us: u64) -> Instant {
        self.start + Duration::from_micros(monotonic_us)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}
