//! Monotonic time helpers.
//!
//! Every timing gate in the core (start grace period, stop deadline, backoff
//! cooldown) is expressed as an absolute monotonic timestamp in nanoseconds,
//! stored as `u64`. Arithmetic is saturating so a clock discontinuity can
//! never wrap a deadline.

use nix::time::{clock_gettime, ClockId};

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Current monotonic time in nanoseconds.
///
/// Reads `CLOCK_MONOTONIC`. The zero point is arbitrary; only differences
/// between two readings are meaningful.
pub fn monotonic_ns() -> u64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => {
            (ts.tv_sec() as u64).saturating_mul(NANOS_PER_SEC).saturating_add(ts.tv_nsec() as u64)
        }
        // CLOCK_MONOTONIC is mandatory on every supported platform; a
        // failure here means the process environment is unusable anyway.
        Err(_) => 0,
    }
}

/// Nanoseconds elapsed between `since` and `now`, saturating at zero.
pub fn elapsed_ns(since: u64, now: u64) -> u64 {
    now.saturating_sub(since)
}

/// Converts whole seconds to nanoseconds, saturating at `u64::MAX`.
///
/// Saturation makes `u64::MAX` seconds behave as "never": a deadline
/// computed from it can never be reached by the monotonic clock.
pub fn secs_to_ns(secs: u64) -> u64 {
    secs.saturating_mul(NANOS_PER_SEC)
}
