//! # Token Bucket
//!
//! One channel's admission state: a continuously refilling, lock-free token
//! bucket whose capacity can be changed while callers are acquiring.
//!
//! ```text
//!     Packed state word (one AtomicU64):
//!
//!     63            40 39                                 0
//!     ┌───────────────┬───────────────────────────────────┐
//!     │   capacity    │   banked tokens (milli-permits)   │
//!     │   (24 bits)   │   (40 bits)                       │
//!     └───────────────┴───────────────────────────────────┘
//!
//!     last_refill_ns (separate AtomicU64, cache-aligned)
//! ```
//!
//! Capacity and tokens change together through a single CAS, so no caller
//! can see a new capacity next to a stale token count. Every write caps the
//! tokens by the capacity stored in the same word, which is what keeps
//! `tokens <= capacity` true at every instant, including straight after a
//! capacity reduction.
//!
//! ## Refill
//!
//! ```text
//!     earned = elapsed_ns × capacity / 1_000_000     (milli-permits)
//!
//!     full bucket / zero capacity ──► timestamp := now, nothing banked
//!     earned == 0                 ──► timestamp untouched, keep accruing
//!     earned  < room              ──► timestamp += time actually converted
//!     earned >= room              ──► timestamp := now, bucket filled
//! ```
//!
//! A refill first claims its time window with a CAS on the timestamp, then
//! deposits the earned tokens with a CAS loop on the state word. Losing the
//! timestamp CAS means another caller is depositing the same window.

use super::{
    clock::{Clock, SystemClock},
    config::{MemoryOrdering, MAX_RATE},
    error::{checked_rate, ThrottleResult},
    metrics::BucketMetrics,
    utils::{Backoff, CacheAligned},
};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::trace;

/// Bits of the state word holding banked milli-permits.
const TOKEN_BITS: u32 = 40;

const TOKEN_MASK: u64 = (1 << TOKEN_BITS) - 1;

/// Fixed-point scale: one permit is this many milli-permits.
const MILLIS_PER_PERMIT: u64 = 1_000;

/// Nanoseconds to earn one milli-permit at a rate of one permit per second.
const NANOS_PER_MILLI: u64 = 1_000_000_000 / MILLIS_PER_PERMIT;

/// Backoff step after which contended CAS loops yield to the scheduler.
const MAX_BACKOFF_STEP: u32 = 6;

/// Capacity and banked milli-permits, as stored in the atomic word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BucketWord(u64);

impl BucketWord {
    #[inline(always)]
    fn new(capacity: u32, milli_tokens: u64) -> Self {
        debug_assert!(capacity <= MAX_RATE);
        debug_assert!(milli_tokens <= u64::from(capacity) * MILLIS_PER_PERMIT);
        Self((u64::from(capacity) << TOKEN_BITS) | (milli_tokens & TOKEN_MASK))
    }

    #[inline(always)]
    fn full(capacity: u32) -> Self {
        Self::new(capacity, u64::from(capacity) * MILLIS_PER_PERMIT)
    }

    #[inline(always)]
    fn capacity(self) -> u32 {
        (self.0 >> TOKEN_BITS) as u32
    }

    #[inline(always)]
    fn milli_tokens(self) -> u64 {
        self.0 & TOKEN_MASK
    }

    #[inline(always)]
    fn max_milli_tokens(self) -> u64 {
        u64::from(self.capacity()) * MILLIS_PER_PERMIT
    }

    #[inline(always)]
    fn room(self) -> u64 {
        self.max_milli_tokens().saturating_sub(self.milli_tokens())
    }

    #[inline(always)]
    fn permits(self) -> u64 {
        self.milli_tokens() / MILLIS_PER_PERMIT
    }

    #[inline(always)]
    fn with_milli_tokens(self, milli_tokens: u64) -> Self {
        Self::new(self.capacity(), milli_tokens.min(self.max_milli_tokens()))
    }
}

/// Lock-free, reconfigurable token bucket for one traffic channel.
///
/// `capacity` is both the burst ceiling and the sustained rate in permits
/// per second. A fresh bucket starts full.
///
/// # Example
///
/// ```rust
/// use dispatch_throttle::TokenBucket;
///
/// let bucket = TokenBucket::new(2);
/// assert!(bucket.acquire());
/// assert!(bucket.acquire());
/// assert!(!bucket.acquire());
///
/// // Shrinking clamps, growing never adds tokens.
/// bucket.set_capacity(10).unwrap();
/// assert!(bucket.set_capacity(-1).is_err());
/// ```
#[repr(C)]
pub struct TokenBucket<C = SystemClock> {
    /// Packed capacity and banked milli-permits.
    state: CacheAligned<AtomicU64>,

    /// Clock reading up to which time has been converted into tokens.
    last_refill_ns: CacheAligned<AtomicU64>,

    /// Rejections since the last successful acquire.
    consecutive_rejections: AtomicU32,

    ordering: MemoryOrdering,

    clock: C,

    total_acquired: AtomicU64,
    total_rejected: AtomicU64,
    total_refills: AtomicU64,
    total_reconfigurations: AtomicU64,
    cas_retries: AtomicU64,
}

impl TokenBucket<SystemClock> {
    /// Creates a full bucket on the process monotonic clock.
    ///
    /// Capacities above [`MAX_RATE`] are clamped to it.
    pub fn new(capacity: u32) -> Self {
        Self::with_clock(capacity, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Creates a full bucket reading time from `clock`.
    ///
    /// Capacities above [`MAX_RATE`] are clamped to it.
    pub fn with_clock(capacity: u32, clock: C) -> Self {
        let now_ns = clock.now_nanos();
        Self {
            state: CacheAligned::new(AtomicU64::new(BucketWord::full(capacity.min(MAX_RATE)).0)),
            last_refill_ns: CacheAligned::new(AtomicU64::new(now_ns)),
            consecutive_rejections: AtomicU32::new(0),
            ordering: MemoryOrdering::default(),
            clock,
            total_acquired: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            total_refills: AtomicU64::new(0),
            total_reconfigurations: AtomicU64::new(0),
            cas_retries: AtomicU64::new(0),
        }
    }

    /// Sets the memory ordering used by every atomic on this bucket.
    pub fn with_ordering(mut self, ordering: MemoryOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Attempts to take one permit right now.
    ///
    /// Refills from elapsed time, then atomically consumes one permit.
    /// Returns `false` without changing state when less than one whole
    /// permit is banked. Never blocks or sleeps.
    ///
    /// ```text
    ///     acquire() flow:
    ///
    ///     Refill ──► ≥ 1 permit? ──Yes──► CAS decrement ──► true
    ///                     │                    │
    ///                     No                 lost race ──► reload, retry
    ///                     ▼
    ///                   false
    /// ```
    #[inline]
    pub fn acquire(&self) -> bool {
        self.refill(self.clock.now_nanos());

        let mut backoff = Backoff::new(MAX_BACKOFF_STEP);
        let mut current = self.load_word();
        loop {
            let tokens = current.milli_tokens();
            if tokens < MILLIS_PER_PERMIT {
                self.on_rejection();
                return false;
            }

            let next = current.with_milli_tokens(tokens - MILLIS_PER_PERMIT);
            match self.state.get().compare_exchange_weak(
                current.0,
                next.0,
                self.ordering.rmw(),
                self.ordering.cas_failure(),
            ) {
                Ok(_) => {
                    self.on_acquisition();
                    return true;
                }
                Err(actual) => {
                    current = BucketWord(actual);
                    self.on_contention(&mut backoff);
                }
            }
        }
    }

    /// Replaces the capacity, effective immediately for every caller.
    ///
    /// Time elapsed so far is first credited at the old capacity. Banked
    /// tokens above the new capacity are dropped; a larger capacity does
    /// not add tokens by itself. `0` is legal and denies every acquire
    /// until the capacity is raised again.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`](crate::ThrottleError::InvalidRate)
    /// for a negative value or one above [`MAX_RATE`]. Nothing changes.
    pub fn set_capacity(&self, capacity: i64) -> ThrottleResult<()> {
        let capacity = checked_rate(capacity)?;

        self.refill(self.clock.now_nanos());

        let mut backoff = Backoff::new(MAX_BACKOFF_STEP);
        let mut current = self.load_word();
        loop {
            let kept = current
                .milli_tokens()
                .min(u64::from(capacity) * MILLIS_PER_PERMIT);
            let next = BucketWord::new(capacity, kept);
            match self.state.get().compare_exchange_weak(
                current.0,
                next.0,
                self.ordering.rmw(),
                self.ordering.cas_failure(),
            ) {
                Ok(_) => break,
                Err(actual) => {
                    current = BucketWord(actual);
                    self.on_contention(&mut backoff);
                }
            }
        }

        self.total_reconfigurations
            .fetch_add(1, self.ordering.rmw());
        trace!(
            "Bucket capacity {} -> {} ({} permits banked)",
            current.capacity(),
            capacity,
            current.permits().min(u64::from(capacity))
        );
        Ok(())
    }

    /// Current capacity in permits per second.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.load_word().capacity()
    }

    /// Whole permits available right now, after crediting elapsed time.
    pub fn available_permits(&self) -> u64 {
        self.refill(self.clock.now_nanos());
        self.load_word().permits()
    }

    /// Restores a full bucket at `capacity` and zeroes every counter.
    ///
    /// Capacities above [`MAX_RATE`] are clamped to it.
    pub fn reset(&self, capacity: u32) {
        let store = self.ordering.store();
        let now_ns = self.clock.now_nanos();

        self.last_refill_ns.get().store(now_ns, store);
        self.state
            .get()
            .store(BucketWord::full(capacity.min(MAX_RATE)).0, store);
        self.consecutive_rejections.store(0, store);
        self.total_acquired.store(0, store);
        self.total_rejected.store(0, store);
        self.total_refills.store(0, store);
        self.total_reconfigurations.store(0, store);
        self.cas_retries.store(0, store);
    }

    /// Snapshot of counters and capacity for monitoring.
    ///
    /// Counters are read individually, so a snapshot taken under load is
    /// approximate across fields.
    pub fn metrics(&self) -> BucketMetrics {
        let ordering = self.ordering.load();
        let word = self.load_word();
        let total_acquired = self.total_acquired.load(ordering);
        let total_rejected = self.total_rejected.load(ordering);
        let total = total_acquired + total_rejected;

        BucketMetrics {
            total_acquired,
            total_rejected,
            total_refills: self.total_refills.load(ordering),
            total_reconfigurations: self.total_reconfigurations.load(ordering),
            current_permits: word.permits(),
            capacity: word.capacity(),
            consecutive_rejections: self.consecutive_rejections.load(ordering),
            cas_retries: self.cas_retries.load(ordering),
            pressure_ratio: if total == 0 {
                0.0
            } else {
                total_rejected as f64 / total as f64
            },
        }
    }

    /// Current reading of the clock this bucket refills from.
    #[inline]
    pub(crate) fn now_nanos(&self) -> u64 {
        self.clock.now_nanos()
    }

    #[inline(always)]
    fn load_word(&self) -> BucketWord {
        BucketWord(self.state.get().load(self.ordering.load()))
    }

    /// Converts time elapsed since the last refill into banked tokens.
    #[inline]
    fn refill(&self, now_ns: u64) {
        let last_ns = self.last_refill_ns.get().load(self.ordering.load());
        let elapsed = now_ns.saturating_sub(last_ns);
        if elapsed == 0 {
            return;
        }

        let word = self.load_word();
        let capacity = u64::from(word.capacity());
        let room = word.room();
        if capacity == 0 || room == 0 {
            // Idle time is not banked
            let _ = self.last_refill_ns.get().compare_exchange(
                last_ns,
                now_ns,
                self.ordering.rmw(),
                self.ordering.cas_failure(),
            );
            return;
        }

        let earned = u128::from(elapsed) * u128::from(capacity) / u128::from(NANOS_PER_MILLI);
        if earned == 0 {
            return;
        }

        let (deposit, claimed_until) = if earned >= u128::from(room) {
            // deposit caps at capacity
            (u64::try_from(earned).unwrap_or(u64::MAX), now_ns)
        } else {
            // earned < room, so it fits in u64. Rounding the claimed time up
            // keeps every nanosecond credited once; spent <= elapsed still holds.
            let earned = earned as u64;
            let capacity = u128::from(capacity);
            let spent = (u128::from(earned) * u128::from(NANOS_PER_MILLI) + capacity - 1) / capacity;
            (earned, last_ns + spent as u64)
        };

        if self
            .last_refill_ns
            .get()
            .compare_exchange(
                last_ns,
                claimed_until,
                self.ordering.rmw(),
                self.ordering.cas_failure(),
            )
            .is_ok()
        {
            self.deposit(deposit);
        }
    }

    /// Adds milli-permits, capped by the capacity in the same word.
    fn deposit(&self, milli_tokens: u64) {
        let mut backoff = Backoff::new(MAX_BACKOFF_STEP);
        let mut current = self.load_word();
        loop {
            let next = current.with_milli_tokens(current.milli_tokens().saturating_add(milli_tokens));
            if next == current {
                return;
            }

            match self.state.get().compare_exchange_weak(
                current.0,
                next.0,
                self.ordering.rmw(),
                self.ordering.cas_failure(),
            ) {
                Ok(_) => {
                    self.total_refills.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        "Refilled {} milli-permits (capacity: {})",
                        next.milli_tokens() - current.milli_tokens(),
                        next.capacity()
                    );
                    return;
                }
                Err(actual) => {
                    current = BucketWord(actual);
                    self.on_contention(&mut backoff);
                }
            }
        }
    }

    #[inline]
    fn on_acquisition(&self) {
        self.total_acquired.fetch_add(1, self.ordering.rmw());

        // Avoid a store on the hot path when there is nothing to reset
        if self.consecutive_rejections.load(Ordering::Relaxed) > 0 {
            self.consecutive_rejections.store(0, self.ordering.store());
        }
    }

    #[inline]
    fn on_rejection(&self) {
        self.total_rejected.fetch_add(1, self.ordering.rmw());
        self.consecutive_rejections
            .fetch_add(1, self.ordering.rmw());
    }

    #[inline]
    fn on_contention(&self, backoff: &mut Backoff) {
        self.cas_retries.fetch_add(1, Ordering::Relaxed);
        if backoff.is_at_max() {
            trace!("Bucket CAS loop yielding under contention");
        }
        backoff.backoff();
    }
}

impl<C> std::fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let word = BucketWord(self.state.get().load(Ordering::Relaxed));
        f.debug_struct("TokenBucket")
            .field("capacity", &word.capacity())
            .field("available_permits", &word.permits())
            .field("ordering", &self.ordering)
            .finish()
    }
}
