//! # Time Sources
//!
//! Buckets never read the wall clock directly. They ask a [`Clock`] for a
//! monotonic nanosecond reading, which lets production code use the real
//! monotonic clock and tests drive time by hand.
//!
//! ```text
//!     SystemClock ──► Instant captured at first use ──► elapsed ns
//!     ManualClock ──► shared AtomicU64 ──► advanced explicitly by tests
//! ```

use super::utils::monotonic_nanos;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of monotonic time in nanoseconds.
///
/// Readings must never decrease. Two consecutive identical readings are
/// legal and mean "no time has passed".
pub trait Clock: Send + Sync {
    /// Returns the current reading in nanoseconds.
    fn now_nanos(&self) -> u64;
}

/// Monotonic process clock backed by [`std::time::Instant`].
///
/// Immune to wall-clock jumps. All `SystemClock` values share one origin,
/// so readings from different buckets are comparable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline(always)]
    fn now_nanos(&self) -> u64 {
        monotonic_nanos()
    }
}

/// Hand-driven clock for deterministic tests and simulations.
///
/// Clones share the same underlying reading, so a test can keep one handle
/// and give another to a bucket or service.
///
/// # Example
///
/// ```rust
/// use dispatch_throttle::{ManualClock, TokenBucket};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let bucket = TokenBucket::with_clock(2, clock.clone());
///
/// assert!(bucket.acquire());
/// assert!(bucket.acquire());
/// assert!(!bucket.acquire());
///
/// clock.advance(Duration::from_millis(500));
/// assert!(bucket.acquire());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward. Saturates instead of wrapping.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let mut current = self.nanos.load(Ordering::Acquire);
        loop {
            match self.nanos.compare_exchange_weak(
                current,
                current.saturating_add(by),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Moves the clock forward by whole nanoseconds.
    pub fn advance_nanos(&self, nanos: u64) {
        self.advance(Duration::from_nanos(nanos));
    }

    /// Sets an absolute reading. Readings earlier than the current one are
    /// ignored so the clock stays monotonic.
    pub fn set_nanos(&self, nanos: u64) {
        self.nanos.fetch_max(nanos, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::Acquire)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_nanos(&self) -> u64 {
        (**self).now_nanos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock;
        let mut last = clock.now_nanos();
        for _ in 0..100 {
            let now = clock.now_nanos();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        assert_eq!(clock.now_nanos(), 0);
        handle.advance(Duration::from_millis(3));
        assert_eq!(clock.now_nanos(), 3_000_000);

        clock.advance_nanos(7);
        assert_eq!(handle.now_nanos(), 3_000_007);
    }

    #[test]
    fn test_manual_clock_never_goes_backwards() {
        let clock = ManualClock::new();
        clock.set_nanos(1_000);
        clock.set_nanos(500);
        assert_eq!(clock.now_nanos(), 1_000);
    }

    #[test]
    fn test_manual_clock_saturates() {
        let clock = ManualClock::new();
        clock.set_nanos(u64::MAX - 1);
        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now_nanos(), u64::MAX);
    }

    #[test]
    fn test_arc_clock() {
        let clock = Arc::new(ManualClock::new());
        clock.advance_nanos(42);
        assert_eq!(Clock::now_nanos(&clock), 42);
    }
}
