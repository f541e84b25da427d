//! Monotonic millisecond clock
//!
//! Timestamps are `u32` milliseconds that wrap roughly every 49.7 days, the
//! same shape as a microcontroller tick counter. All interval arithmetic goes
//! through [`elapsed_ms`], which is modular and therefore wraparound-safe.

use std::time::Instant;

/// Source of monotonic time for backoff and timeout bookkeeping
pub trait Clock {
    /// Milliseconds since an arbitrary epoch, wrapping at `u32::MAX`
    fn now_ms(&self) -> u32;
}

/// Milliseconds from `since` to `now`, treating the counter as modular
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Wall-independent clock for host builds
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap
        self.origin.elapsed().as_millis() as u32
    }
}
