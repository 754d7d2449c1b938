//! # Throttle Configuration
//!
//! Default per-channel rates and the memory ordering used by bucket atomics.
//!
//! ```text
//!     ThrottleConfig
//!     ┌──────────────────────────────┐
//!     │ in_app_rate: 100 permits/s   │ ← InApp bucket capacity
//!     │ push_rate:    50 permits/s   │ ← Push bucket capacity
//!     │ ordering: AcquireRelease     │ ← Atomic synchronization
//!     └──────────────────────────────┘
//! ```
//!
//! These values are what [`RateLimiterService::init`] restores. Runtime
//! changes made through the rate setters do not alter the config.
//!
//! [`RateLimiterService::init`]: crate::RateLimiterService::init

use super::error::{checked_rate, ThrottleResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

/// Largest capacity a bucket accepts, in permits per second.
///
/// Capacity and banked tokens share one 64-bit atomic word: 24 bits of
/// capacity and 40 bits of milli-permits.
pub const MAX_RATE: u32 = (1 << 24) - 1;

/// Capacity given to the in-app message channel by `init`.
pub const DEFAULT_IN_APP_MSG_RATE: u32 = 100;

/// Capacity given to the push notification channel by `init`.
pub const DEFAULT_PUSH_MSG_RATE: u32 = 50;

/// Memory ordering strategy for atomic operations.
///
/// - Use `Relaxed` when you need maximum speed and exact counts under
///   contention are not critical
/// - Use `AcquireRelease` (default) for most use cases
/// - Use `Sequential` when debugging synchronization issues
///
/// ```rust
/// use dispatch_throttle::{MemoryOrdering, ThrottleConfig};
///
/// let config = ThrottleConfig::default().with_ordering(MemoryOrdering::Sequential);
/// assert_eq!(config.ordering, MemoryOrdering::Sequential);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryOrdering {
    /// Relaxed ordering - fastest but provides minimal guarantees.
    Relaxed,

    /// Acquire-Release ordering - balanced performance and correctness.
    #[default]
    AcquireRelease,

    /// Sequential consistency - strongest guarantees but slower.
    Sequential,
}

impl MemoryOrdering {
    /// Ordering for plain loads.
    #[inline(always)]
    pub(crate) fn load(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::Acquire,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    /// Ordering for plain stores.
    #[inline(always)]
    pub(crate) fn store(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::Release,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    /// Ordering for read-modify-write operations and successful CAS.
    #[inline(always)]
    pub(crate) fn rmw(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::AcqRel,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    /// Ordering for the reload after a failed CAS.
    #[inline(always)]
    pub(crate) fn cas_failure(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::Acquire,
            Self::Sequential => Ordering::SeqCst,
        }
    }
}

/// Default capacities for both channels.
///
/// Deserializable so outer configuration layers can embed it; every field
/// falls back to its default when absent.
///
/// ```rust
/// use dispatch_throttle::ThrottleConfig;
///
/// let config = ThrottleConfig::new(500, 200);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// In-app message permits per second.
    #[serde(default = "default_in_app_rate")]
    pub in_app_rate: u32,

    /// Push notification permits per second.
    #[serde(default = "default_push_rate")]
    pub push_rate: u32,

    /// Memory ordering for bucket atomics.
    #[serde(default)]
    pub ordering: MemoryOrdering,
}

fn default_in_app_rate() -> u32 {
    DEFAULT_IN_APP_MSG_RATE
}

fn default_push_rate() -> u32 {
    DEFAULT_PUSH_MSG_RATE
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            in_app_rate: default_in_app_rate(),
            push_rate: default_push_rate(),
            ordering: MemoryOrdering::default(),
        }
    }
}

impl ThrottleConfig {
    /// Creates a config with the given per-second rates.
    pub fn new(in_app_rate: u32, push_rate: u32) -> Self {
        Self {
            in_app_rate,
            push_rate,
            ordering: MemoryOrdering::default(),
        }
    }

    /// Sets the in-app message rate.
    pub fn with_in_app_rate(mut self, rate: u32) -> Self {
        self.in_app_rate = rate;
        self
    }

    /// Sets the push notification rate.
    pub fn with_push_rate(mut self, rate: u32) -> Self {
        self.push_rate = rate;
        self
    }

    /// Sets the memory ordering strategy.
    pub fn with_ordering(mut self, ordering: MemoryOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Checks both rates fit in a bucket.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`](crate::ThrottleError::InvalidRate) if
    /// either rate exceeds [`MAX_RATE`].
    pub fn validate(&self) -> ThrottleResult<()> {
        checked_rate(i64::from(self.in_app_rate))?;
        checked_rate(i64::from(self.push_rate))?;
        Ok(())
    }
}
