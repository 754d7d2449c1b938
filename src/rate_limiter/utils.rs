//! # Utility Functions (utils.rs)
//!
//! Low-level helpers shared by the bucket CAS loops: spin hints, contention
//! backoff, cache-line padding and the process-wide monotonic time origin.
//!
//! ```text
//!     Platform-Specific Features:
//!
//!     x86_64 (Intel/AMD):
//!     ├─ Cache line: 64 bytes
//!     └─ PAUSE instruction for spin loops
//!
//!     AArch64 (ARM):
//!     ├─ Cache line: 128 bytes
//!     └─ YIELD instruction for spin loops
//!
//!     Generic (Fallback):
//!     ├─ Cache line: 64 bytes (assumed)
//!     └─ Standard spin loop hints
//! ```

use std::sync::OnceLock;
use std::time::Instant;

/// Cache line size for x86_64 processors (Intel/AMD).
#[cfg(target_arch = "x86_64")]
pub(crate) const CACHE_LINE_SIZE: usize = 64;

/// Cache line size for ARM64 processors.
///
/// Many ARM processors use 128-byte cache lines.
#[cfg(target_arch = "aarch64")]
pub(crate) const CACHE_LINE_SIZE: usize = 128;

/// Default cache line size for other architectures.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) const CACHE_LINE_SIZE: usize = 64;

// Captured on first use; every SystemClock reading is relative to it.
static MONOTONIC_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// CPU-specific relaxation hint for spin loops.
///
/// - **x86_64**: PAUSE
/// - **ARM64**: YIELD
/// - **Others**: standard spin loop hint
///
/// ```rust
/// use dispatch_throttle::cpu_relax;
///
/// for _ in 0..4 {
///     cpu_relax();
/// }
/// ```
#[inline(always)]
pub fn cpu_relax() {
    std::hint::spin_loop();
}

/// Returns nanoseconds elapsed since the process-wide monotonic origin.
///
/// The origin is fixed the first time any caller asks, so readings are
/// small, never decrease, and ignore wall-clock adjustments. Saturates
/// after roughly 584 years of uptime.
///
/// ```rust
/// use dispatch_throttle::monotonic_nanos;
///
/// let a = monotonic_nanos();
/// let b = monotonic_nanos();
/// assert!(b >= a);
/// ```
#[inline(always)]
pub fn monotonic_nanos() -> u64 {
    let origin = MONOTONIC_ORIGIN.get_or_init(Instant::now);
    u64::try_from(origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Cache-aligned wrapper for values to prevent false sharing.
///
/// The packed bucket word and the refill timestamp are written by every
/// caller; keeping them on separate lines stops one from invalidating the
/// other.
///
/// ```text
///     Without Cache Alignment:
///     ┌─────────────────────────┐
///     │ state word │ timestamp  │ ← Same cache line
///     └─────────────────────────┘
///
///     With Cache Alignment:
///     ┌─────────────────────────┐
///     │       state word        │ ← Own cache line
///     └─────────────────────────┘
///     ┌─────────────────────────┐
///     │       timestamp         │ ← Own cache line
///     └─────────────────────────┘
/// ```
#[cfg(target_arch = "x86_64")]
#[repr(C, align(64))]
pub(crate) struct CacheAligned<T>(pub(crate) T);
#[cfg(target_arch = "aarch64")]
#[repr(C, align(128))]
pub(crate) struct CacheAligned<T>(pub(crate) T);
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[repr(C, align(64))]
pub(crate) struct CacheAligned<T>(pub(crate) T);

const _: () = assert!(std::mem::align_of::<CacheAligned<u64>>() == CACHE_LINE_SIZE);

impl<T> CacheAligned<T> {
    /// Creates a new cache-aligned value.
    #[inline(always)]
    pub(crate) const fn new(value: T) -> Self {
        Self(value)
    }

    /// Gets a reference to the inner value.
    #[inline(always)]
    pub(crate) fn get(&self) -> &T {
        &self.0
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CacheAligned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Exponential backoff for CAS retry loops.
///
/// ```text
///     Attempt 1: Spin 1 time
///     Attempt 2: Spin 2 times
///     Attempt 3: Spin 4 times
///     Attempt 4: Spin 8 times
///     Attempt 5+: Yield to scheduler
/// ```
///
/// Loops using it never give up: a failed CAS means another caller made
/// progress, so retrying until success keeps every operation linearizable.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    step: u32,
    max_step: u32,
}

/// Step after which [`Backoff`] yields instead of spinning.
const SPIN_LIMIT: u32 = 4;

impl Backoff {
    /// Creates a backoff helper that stops escalating at `max_step`.
    pub(crate) fn new(max_step: u32) -> Self {
        Self { step: 0, max_step }
    }

    /// Waits a little longer than the previous call did.
    #[inline]
    pub(crate) fn backoff(&mut self) {
        if self.step < SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                cpu_relax();
            }
        } else {
            std::thread::yield_now();
        }
        self.step = (self.step + 1).min(self.max_step);
    }

    /// Checks if we've reached the maximum backoff level.
    #[inline]
    pub(crate) fn is_at_max(&self) -> bool {
        self.step >= self.max_step
    }
}
