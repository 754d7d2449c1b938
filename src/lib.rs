//! # dispatch-throttle - Admission Control for Message Dispatch
//!
//! Lock-free rate limiting for two independent classes of outbound traffic:
//! in-app messages and mobile push notifications. Producers ask "may I send
//! now?" and get an immediate yes or no; operators change the allowed rate
//! of either channel at runtime without restarting anything.
//!
//! ## The Token Bucket Algorithm
//!
//! Each channel has a bucket holding up to `capacity` permits that refills
//! continuously at `capacity` permits per second:
//!
//! ```text
//!     capacity = 5 permits/s
//!
//!     t = 0.0s   [■■■■■]  burst of 7 callers → 5 granted, 2 denied
//!     t = 0.0s   [     ]
//!     t = 0.4s   [■■   ]  2 permits earned back
//!     t = 1.0s   [■■■■■]  full again, never above capacity
//! ```
//!
//! - A burst of `N` simultaneous callers gets exactly `min(N, capacity)` permits
//! - A steady rate at or below capacity is never denied
//! - A steady rate `r` above capacity is denied `(r - capacity) / r` of the time
//!
//! ## Quick Start
//!
//! ```rust
//! use dispatch_throttle::RateLimiterService;
//!
//! let service = RateLimiterService::global();
//!
//! if service.get_push_permit() {
//!     // hand the notification to the push gateway
//! } else {
//!     // caller decides: drop, queue or retry later
//! }
//!
//! // An operator raises the push rate while traffic is flowing
//! service.set_push_msg_rate(200).unwrap();
//! ```
//!
//! ### Builder and Injection
//!
//! ```rust
//! use dispatch_throttle::{MemoryOrdering, ThrottleServiceBuilder};
//! use std::sync::Arc;
//!
//! let service = Arc::new(
//!     ThrottleServiceBuilder::new()
//!         .in_app_rate(1_000)
//!         .push_rate(100)
//!         .memory_ordering(MemoryOrdering::AcquireRelease)
//!         .build()
//!         .unwrap(),
//! );
//!
//! let worker = {
//!     let service = service.clone();
//!     std::thread::spawn(move || service.get_in_app_permit())
//! };
//! assert!(worker.join().unwrap());
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Dispatch code         │
//!                    └──────────┬──────────────┘
//!                               │
//!                    ┌──────────▼──────────────┐
//!                    │   RateLimiterService    │
//!                    ├─────────────────────────┤
//!                    │  • get_*_permit()       │
//!                    │  • set_*_msg_rate()     │
//!                    │  • init() / shutdown()  │
//!                    └──────────┬──────────────┘
//!                               │
//!                ┌──────────────┴───────────────┐
//!                │                              │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │  TokenBucket in_app │       │  TokenBucket push    │
//!     ├─────────────────────┤       ├──────────────────────┤
//!     │ • Packed atomic     │       │ • Packed atomic      │
//!     │ • Continuous refill │       │ • Continuous refill  │
//!     │ • Lock-free CAS     │       │ • Lock-free CAS      │
//!     └─────────────────────┘       └──────────────────────┘
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Time Complexity | Space Complexity |
//! |-----------|----------------|------------------|
//! | get_*_permit() | O(1)* | O(1) |
//! | set_*_msg_rate() | O(1)* | O(1) |
//! | metrics | O(1) | O(1) |
//!
//! *Amortized; CAS loops retry with backoff under contention
//!
//! ## Thread Safety
//!
//! Every operation takes `&self`. Share a service through `Arc`, a plain
//! reference, or [`RateLimiterService::global`]. A capacity change and a
//! token decrement are one atomic word, so no caller ever observes a rate
//! change half applied.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (lifecycle at `info`, rate changes at
//! `debug`, refills at `trace`, refused rates at `warn`) and never installs
//! a subscriber itself.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

mod rate_limiter;

pub use rate_limiter::{
    cpu_relax, monotonic_nanos, BridgeOutcome, BridgeReport, BucketMetrics, Channel, Clock,
    ConfigBridge, HealthStatus, ManualClock, MemoryOrdering, PropertyChange, RateLimiterService,
    ServiceStats, SystemClock, ThrottleConfig, ThrottleError, ThrottleResult, TokenBucket,
    DEFAULT_IN_APP_MSG_RATE, DEFAULT_PUSH_MSG_RATE, IN_APP_RATE_PROPERTY, MAX_RATE,
    PUSH_RATE_PROPERTY,
};

/// A service wrapped in `Arc` for sharing with dispatch workers.
///
/// # Example
/// ```rust
/// use dispatch_throttle::{RateLimiterService, SharedThrottle};
/// use std::sync::Arc;
///
/// let shared: SharedThrottle = Arc::new(RateLimiterService::new());
///
/// let worker = shared.clone();
/// std::thread::spawn(move || {
///     worker.get_in_app_permit();
/// });
/// ```
pub type SharedThrottle = std::sync::Arc<RateLimiterService>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
///
/// This crate requires at least Rust 1.70.0 due to:
/// - `std::sync::OnceLock`
/// - `let ... else`
/// - Edition 2021 features
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use dispatch_throttle::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for dispatch code and operators.
    //!
    //! # Example
    //! ```rust
    //! use dispatch_throttle::prelude::*;
    //!
    //! let service = RateLimiterService::new();
    //! let allowed = service.acquire(Channel::Push);
    //! let status = service.metrics(Channel::Push).health_status();
    //! # let _ = (allowed, status);
    //! ```

    pub use crate::{
        Channel, ConfigBridge, HealthStatus, MemoryOrdering, PropertyChange, RateLimiterService,
        SharedThrottle, ThrottleConfig, ThrottleError, ThrottleServiceBuilder,
    };
}

/// Builder for a [`RateLimiterService`] with validated configuration.
///
/// # Example
///
/// ```rust
/// use dispatch_throttle::{ManualClock, ThrottleServiceBuilder, MAX_RATE};
///
/// let service = ThrottleServiceBuilder::new()
///     .in_app_rate(500)
///     .push_rate(50)
///     .build_with_clock(ManualClock::new())
///     .unwrap();
/// assert!(service.get_push_permit());
///
/// let result = ThrottleServiceBuilder::new()
///     .push_rate(MAX_RATE + 1) // Invalid!
///     .build();
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ThrottleServiceBuilder {
    config: ThrottleConfig,
}

impl ThrottleServiceBuilder {
    /// Creates a builder with [`ThrottleConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing config, e.g. one deserialized by the
    /// application.
    pub fn from_config(config: ThrottleConfig) -> Self {
        Self { config }
    }

    /// Sets the default in-app message rate (permits per second).
    pub fn in_app_rate(mut self, rate: u32) -> Self {
        self.config.in_app_rate = rate;
        self
    }

    /// Sets the default push notification rate (permits per second).
    pub fn push_rate(mut self, rate: u32) -> Self {
        self.config.push_rate = rate;
        self
    }

    /// Sets the memory ordering strategy for bucket atomics.
    ///
    /// Unless you have specific requirements, use the default.
    pub fn memory_ordering(mut self, ordering: MemoryOrdering) -> Self {
        self.config.ordering = ordering;
        self
    }

    /// Builds a service on the system monotonic clock.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`] if either rate exceeds [`MAX_RATE`].
    pub fn build(self) -> ThrottleResult<RateLimiterService> {
        RateLimiterService::with_config(self.config)
    }

    /// Builds a service reading time from `clock`.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`] if either rate exceeds [`MAX_RATE`].
    pub fn build_with_clock<C: Clock + Clone>(self, clock: C) -> ThrottleResult<RateLimiterService<C>> {
        RateLimiterService::with_clock(self.config, clock)
    }
}
