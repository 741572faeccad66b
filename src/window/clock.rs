//! Window alignment and wall-clock abstraction
//!
//! [`WindowClock`] is the pure timestamp-to-window mapping. [`Clock`] is the
//! source of "now" for events that arrive without a timestamp, so tests can
//! drive time by hand.

use crate::error::{AggregatorError, Result};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Largest timestamp magnitude accepted, in milliseconds (2^53, exact in f64)
pub const MAX_TIMESTAMP_MS: i64 = 1 << 53;

/// Maps epoch-millisecond timestamps to the start of their fixed-size window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowClock {
    window_size_ms: i64,
}

impl WindowClock {
    pub fn try_new(window_size_ms: i64) -> Result<Self> {
        if window_size_ms <= 0 {
            return Err(AggregatorError::InvalidInput(format!(
                "window size must be positive, got {}ms",
                window_size_ms
            )));
        }
        Ok(WindowClock { window_size_ms })
    }

    /// Size must already be known positive (validated config)
    pub(crate) fn new(window_size_ms: i64) -> Self {
        debug_assert!(window_size_ms > 0);
        WindowClock { window_size_ms }
    }

    pub fn window_size_ms(&self) -> i64 {
        self.window_size_ms
    }

    /// `floor(timestamp / size) * size`, flooring toward negative infinity
    #[inline]
    pub fn window_start(&self, timestamp_ms: i64) -> Result<i64> {
        let timestamp_ms = check_timestamp(timestamp_ms)?;
        timestamp_ms
            .div_euclid(self.window_size_ms)
            .checked_mul(self.window_size_ms)
            .ok_or_else(|| out_of_range(timestamp_ms))
    }

    #[inline]
    pub fn window_end(&self, window_start: i64) -> Result<i64> {
        window_start
            .checked_add(self.window_size_ms)
            .ok_or_else(|| out_of_range(window_start))
    }

    /// Start and end of the window containing `timestamp_ms`
    pub fn window_bounds(&self, timestamp_ms: i64) -> Result<(i64, i64)> {
        let start = self.window_start(timestamp_ms)?;
        Ok((start, self.window_end(start)?))
    }

    /// Window start for a raw numeric timestamp
    pub fn window_start_f64(&self, timestamp_ms: f64) -> Result<i64> {
        self.window_start(timestamp_from_f64(timestamp_ms)?)
    }
}

fn out_of_range(timestamp_ms: impl std::fmt::Display) -> AggregatorError {
    AggregatorError::InvalidInput(format!("timestamp {} is out of range", timestamp_ms))
}

/// Reject timestamps whose magnitude exceeds [`MAX_TIMESTAMP_MS`]
pub fn check_timestamp(timestamp_ms: i64) -> Result<i64> {
    if timestamp_ms.unsigned_abs() > MAX_TIMESTAMP_MS as u64 {
        return Err(out_of_range(timestamp_ms));
    }
    Ok(timestamp_ms)
}

/// Convert a raw numeric timestamp to whole milliseconds.
///
/// Rejects NaN, infinities and magnitudes beyond 2^53. Fractional
/// milliseconds are floored.
pub fn timestamp_from_f64(timestamp_ms: f64) -> Result<i64> {
    if !timestamp_ms.is_finite() {
        return Err(AggregatorError::InvalidInput(format!(
            "timestamp must be finite, got {}",
            timestamp_ms
        )));
    }
    if timestamp_ms.abs() > MAX_TIMESTAMP_MS as f64 {
        return Err(out_of_range(timestamp_ms));
    }
    Ok(timestamp_ms.floor() as i64)
}

/// Source of the current time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Hand-driven clock for tests and replays
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        ManualClock {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_MINUTES: i64 = 600_000;

    #[test]
    fn test_window_start_bounds() {
        let clock = WindowClock::new(TEN_MINUTES);
        for t in [0, 1, 599_999, 600_000, 600_001, 1_700_000_123_456, -1, -600_000, -600_001] {
            let start = clock.window_start(t).unwrap();
            assert!(start <= t, "start {} > t {}", start, t);
            assert!(t < start + TEN_MINUTES);
            assert_eq!(start.rem_euclid(TEN_MINUTES), 0);
            assert_eq!(clock.window_start(start).unwrap(), start);
        }
    }

    #[test]
    fn test_negative_timestamps_floor_down() {
        let clock = WindowClock::new(TEN_MINUTES);
        assert_eq!(clock.window_start(-1).unwrap(), -TEN_MINUTES);
        assert_eq!(clock.window_start(-TEN_MINUTES).unwrap(), -TEN_MINUTES);
    }

    #[test]
    fn test_timestamp_range_edges() {
        let clock = WindowClock::new(TEN_MINUTES);
        for bad in [i64::MIN, i64::MAX, MAX_TIMESTAMP_MS + 1, -MAX_TIMESTAMP_MS - 1] {
            assert!(
                matches!(clock.window_start(bad), Err(AggregatorError::InvalidInput(_))),
                "{} accepted",
                bad
            );
        }

        let (start, end) = clock.window_bounds(MAX_TIMESTAMP_MS).unwrap();
        assert_eq!(end - start, TEN_MINUTES);
        let (start, end) = clock.window_bounds(-MAX_TIMESTAMP_MS).unwrap();
        assert_eq!(end - start, TEN_MINUTES);
        assert!(start <= -MAX_TIMESTAMP_MS);
    }

    #[test]
    fn test_window_arithmetic_never_wraps() {
        let huge = WindowClock::try_new(i64::MAX).unwrap();
        // floor(-1 / MAX) * MAX fits, but the window end does not
        assert_eq!(huge.window_start(-1).unwrap(), -i64::MAX);
        assert_eq!(huge.window_end(-i64::MAX).unwrap(), 0);
        assert!(huge.window_end(1).is_err());
        assert!(huge.window_bounds(MAX_TIMESTAMP_MS).is_ok());
        assert!(WindowClock::new(TEN_MINUTES).window_end(i64::MAX).is_err());
    }

    #[test]
    fn test_try_new_rejects_non_positive_sizes() {
        for size in [0, -1, i64::MIN] {
            assert!(matches!(
                WindowClock::try_new(size),
                Err(AggregatorError::InvalidInput(_))
            ));
        }
        assert_eq!(WindowClock::try_new(1).unwrap().window_size_ms(), 1);
    }

    #[test]
    fn test_f64_input() {
        let clock = WindowClock::new(TEN_MINUTES);
        assert_eq!(clock.window_start_f64(600_000.9).unwrap(), 600_000);
        assert_eq!(clock.window_start_f64(5000.0).unwrap(), 0);

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300] {
            assert!(matches!(
                clock.window_start_f64(bad),
                Err(AggregatorError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);

        let shared = clock.clone();
        shared.set(42);
        assert_eq!(clock.now_millis(), 42);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
