//! # Rate Limiter Service
//!
//! Owns one [`TokenBucket`] per [`Channel`] and exposes the process-wide
//! admission and reconfiguration entry points.
//!
//! ## Architecture
//!
//! ```text
//!     Dispatch paths                       Config bridge
//!     get_in_app_permit() ──┐         ┌── set_in_app_msg_rate(rate)
//!     get_push_permit() ────┤         ├── set_push_msg_rate(rate)
//!                           ▼         ▼
//!                   ┌─────────────────────────┐
//!                   │   RateLimiterService    │
//!                   │  running: AtomicBool    │
//!                   │  ┌────────┐ ┌────────┐  │
//!                   │  │ in_app │ │  push  │  │ ← independent buckets,
//!                   │  │ bucket │ │ bucket │  │   no shared state
//!                   │  └────────┘ └────────┘  │
//!                   └─────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! A new service is already open. [`init`](RateLimiterService::init)
//! restores both buckets to the configured defaults, full, with zeroed
//! counters, every time it is called. [`shutdown`](RateLimiterService::shutdown)
//! closes admission until the next `init`.

use super::{
    bucket::TokenBucket,
    channel::Channel,
    clock::{Clock, SystemClock},
    config::ThrottleConfig,
    error::ThrottleResult,
    metrics::{BucketMetrics, ServiceStats},
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// `stopped_at_ns` value while the service has not been shut down.
const NOT_STOPPED: u64 = u64::MAX;

// Process-wide instance behind `global()` and `init_global()`.
static GLOBAL_SERVICE: OnceLock<RateLimiterService> = OnceLock::new();

/// Two-channel admission service.
///
/// Every method takes `&self` and is safe to call from any number of
/// threads at once. Share it by reference, `Arc`, or through
/// [`RateLimiterService::global`].
///
/// # Example
///
/// ```rust
/// use dispatch_throttle::{RateLimiterService, ThrottleConfig};
///
/// let service = RateLimiterService::with_config(ThrottleConfig::new(2, 1)).unwrap();
///
/// assert!(service.get_push_permit());
/// assert!(!service.get_push_permit());
///
/// // Operators raise the rate while traffic flows
/// service.set_push_msg_rate(500).unwrap();
/// assert!(service.set_push_msg_rate(-1).is_err());
///
/// // In-app traffic is unaffected by the push channel
/// assert!(service.get_in_app_permit());
/// ```
pub struct RateLimiterService<C = SystemClock> {
    in_app: TokenBucket<C>,
    push: TokenBucket<C>,

    /// Capacities restored by `init`.
    default_in_app_rate: AtomicU32,
    default_push_rate: AtomicU32,

    config: ThrottleConfig,
    running: AtomicBool,

    /// Lifecycle clock readings.
    started_at_ns: AtomicU64,
    stopped_at_ns: AtomicU64,
}

impl RateLimiterService<SystemClock> {
    /// Creates a service with [`ThrottleConfig::default`].
    pub fn new() -> Self {
        Self::from_validated(ThrottleConfig::default(), SystemClock)
    }

    /// Creates a service with custom default rates.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`](crate::ThrottleError::InvalidRate) if
    /// the config does not validate.
    pub fn with_config(config: ThrottleConfig) -> ThrottleResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Returns the process-wide service, creating it with the default
    /// config on first use.
    pub fn global() -> &'static Self {
        GLOBAL_SERVICE.get_or_init(|| {
            info!("Installing global throttle service with default rates");
            Self::new()
        })
    }

    /// Applies `config` to the process-wide service and runs `init`.
    ///
    /// The memory ordering of the config only takes effect if this call
    /// creates the global service; the rates always do.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`](crate::ThrottleError::InvalidRate) if
    /// the config does not validate. The global service is left untouched.
    pub fn init_global(config: ThrottleConfig) -> ThrottleResult<&'static Self> {
        config.validate()?;

        let mut created = false;
        let service = GLOBAL_SERVICE.get_or_init(|| {
            created = true;
            Self::from_validated(config.clone(), SystemClock)
        });

        if created {
            info!("Installed global throttle service");
        } else {
            if service.config.ordering != config.ordering {
                debug!(
                    "Global throttle service keeps ordering {:?}, requested {:?}",
                    service.config.ordering, config.ordering
                );
            }
            service.store_defaults(&config);
        }

        service.init();
        Ok(service)
    }
}

impl Default for RateLimiterService<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> RateLimiterService<C> {
    /// Creates a service whose buckets read time from `clock`.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`](crate::ThrottleError::InvalidRate) if
    /// the config does not validate.
    pub fn with_clock(config: ThrottleConfig, clock: C) -> ThrottleResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(config, clock))
    }

    pub(crate) fn from_validated(config: ThrottleConfig, clock: C) -> Self {
        let started_at_ns = clock.now_nanos();
        Self {
            in_app: TokenBucket::with_clock(config.in_app_rate, clock.clone())
                .with_ordering(config.ordering),
            push: TokenBucket::with_clock(config.push_rate, clock)
                .with_ordering(config.ordering),
            default_in_app_rate: AtomicU32::new(config.in_app_rate),
            default_push_rate: AtomicU32::new(config.push_rate),
            config,
            running: AtomicBool::new(true),
            started_at_ns: AtomicU64::new(started_at_ns),
            stopped_at_ns: AtomicU64::new(NOT_STOPPED),
        }
    }
}

impl<C: Clock> RateLimiterService<C> {
    /// Resets both channels to the configured default rates.
    ///
    /// Each call refills both buckets, zeroes their counters, discards
    /// runtime rate changes and reopens admission after a `shutdown`.
    pub fn init(&self) {
        let in_app_rate = self.default_rate(Channel::InApp);
        let push_rate = self.default_rate(Channel::Push);

        self.in_app.reset(in_app_rate);
        self.push.reset(push_rate);
        self.started_at_ns.store(self.in_app.now_nanos(), Ordering::Release);
        self.stopped_at_ns.store(NOT_STOPPED, Ordering::Release);
        let reopened = !self.running.swap(true, Ordering::AcqRel);

        info!(
            "Throttle service initialized (in_app: {}/s, push: {}/s{})",
            in_app_rate,
            push_rate,
            if reopened { ", reopened" } else { "" }
        );
    }

    /// Closes admission: every permit request returns `false` until the
    /// next [`init`](Self::init). Idempotent.
    ///
    /// Rate setters keep working while the service is shut down.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.stopped_at_ns.store(self.in_app.now_nanos(), Ordering::Release);
            info!("Throttle service shut down\n{}", self.stats());
        }
    }

    /// Whether permits are currently being issued.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sets the in-app message rate in permits per second.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`](crate::ThrottleError::InvalidRate) for
    /// a negative or oversized rate. The channel is left unchanged.
    pub fn set_in_app_msg_rate(&self, rate: i64) -> ThrottleResult<()> {
        self.set_rate(Channel::InApp, rate)
    }

    /// Sets the push notification rate in permits per second.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`](crate::ThrottleError::InvalidRate) for
    /// a negative or oversized rate. The channel is left unchanged.
    pub fn set_push_msg_rate(&self, rate: i64) -> ThrottleResult<()> {
        self.set_rate(Channel::Push, rate)
    }

    /// Sets a channel's rate. `0` denies every request on that channel.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`](crate::ThrottleError::InvalidRate) for
    /// a negative or oversized rate. The channel is left unchanged.
    pub fn set_rate(&self, channel: Channel, rate: i64) -> ThrottleResult<()> {
        let bucket = self.bucket(channel);
        let previous = bucket.capacity();

        match bucket.set_capacity(rate) {
            Ok(()) => {
                debug!("Changed {} rate from {}/s to {}/s", channel, previous, rate);
                Ok(())
            }
            Err(err) => {
                warn!("Rejected {} rate change: {}", channel, err);
                Err(err)
            }
        }
    }

    /// Asks for one in-app message permit. Never blocks.
    #[inline]
    pub fn get_in_app_permit(&self) -> bool {
        self.acquire(Channel::InApp)
    }

    /// Asks for one push notification permit. Never blocks.
    #[inline]
    pub fn get_push_permit(&self) -> bool {
        self.acquire(Channel::Push)
    }

    /// Asks for one permit on `channel`. Never blocks.
    ///
    /// Returns `false` when the channel has no banked permit or the service
    /// is shut down.
    #[inline]
    pub fn acquire(&self, channel: Channel) -> bool {
        self.is_running() && self.bucket(channel).acquire()
    }

    /// Current rate of `channel` in permits per second.
    pub fn rate(&self, channel: Channel) -> u32 {
        self.bucket(channel).capacity()
    }

    /// Rate `init` restores for `channel`.
    pub fn default_rate(&self, channel: Channel) -> u32 {
        match channel {
            Channel::InApp => self.default_in_app_rate.load(Ordering::Acquire),
            Channel::Push => self.default_push_rate.load(Ordering::Acquire),
        }
    }

    /// Whole permits `channel` could grant right now.
    pub fn available_permits(&self, channel: Channel) -> u64 {
        self.bucket(channel).available_permits()
    }

    /// Metrics snapshot for one channel.
    pub fn metrics(&self, channel: Channel) -> BucketMetrics {
        self.bucket(channel).metrics()
    }

    /// Metrics snapshot for both channels.
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            running: self.is_running(),
            started_at_ns: self.started_at_ns.load(Ordering::Acquire),
            stopped_at_ns: Some(self.stopped_at_ns.load(Ordering::Acquire))
                .filter(|&stopped| stopped != NOT_STOPPED),
            in_app: self.in_app.metrics(),
            push: self.push.metrics(),
        }
    }

    #[inline(always)]
    fn bucket(&self, channel: Channel) -> &TokenBucket<C> {
        match channel {
            Channel::InApp => &self.in_app,
            Channel::Push => &self.push,
        }
    }

    fn store_defaults(&self, config: &ThrottleConfig) {
        self.default_in_app_rate
            .store(config.in_app_rate, Ordering::Release);
        self.default_push_rate
            .store(config.push_rate, Ordering::Release);
    }
}

impl<C> std::fmt::Debug for RateLimiterService<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterService")
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("in_app", &self.in_app)
            .field("push", &self.push)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::clock::ManualClock;
    use crate::rate_limiter::config::{DEFAULT_IN_APP_MSG_RATE, DEFAULT_PUSH_MSG_RATE, MAX_RATE};
    use crate::ThrottleError;
    use std::time::Duration;

    fn manual(in_app: u32, push: u32) -> (RateLimiterService<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let service = RateLimiterService::with_clock(ThrottleConfig::new(in_app, push), clock.clone())
            .unwrap();
        (service, clock)
    }

    fn drain(service: &RateLimiterService<ManualClock>, channel: Channel) -> usize {
        std::iter::from_fn(|| service.acquire(channel).then_some(()))
            .take(MAX_RATE as usize)
            .count()
    }

    #[test]
    fn test_default_rates() {
        let service = RateLimiterService::new();
        assert!(service.is_running());
        assert_eq!(service.rate(Channel::InApp), DEFAULT_IN_APP_MSG_RATE);
        assert_eq!(service.rate(Channel::Push), DEFAULT_PUSH_MSG_RATE);
    }

    #[test]
    fn test_channels_are_independent() {
        let (service, _clock) = manual(5, 3);

        assert_eq!(drain(&service, Channel::InApp), 5);
        assert!(!service.get_in_app_permit());

        assert_eq!(drain(&service, Channel::Push), 3);
        assert_eq!(service.metrics(Channel::InApp).total_acquired, 5);
        assert_eq!(service.metrics(Channel::Push).total_acquired, 3);
    }

    #[test]
    fn test_rate_setters() {
        let (service, clock) = manual(5, 5);

        service.set_in_app_msg_rate(2).unwrap();
        service.set_push_msg_rate(0).unwrap();
        assert_eq!(service.rate(Channel::InApp), 2);
        assert_eq!(service.rate(Channel::Push), 0);

        assert_eq!(drain(&service, Channel::InApp), 2);
        clock.advance(Duration::from_secs(1));
        assert!(!service.get_push_permit());
    }

    #[test]
    fn test_invalid_rate_leaves_channel_untouched() {
        let (service, _clock) = manual(5, 5);

        let err = service.set_in_app_msg_rate(-7).unwrap_err();
        assert_eq!(err, ThrottleError::InvalidRate { rate: -7, max: MAX_RATE });
        assert_eq!(service.rate(Channel::InApp), 5);
        assert_eq!(service.available_permits(Channel::InApp), 5);
    }

    #[test]
    fn test_init_resets_to_defaults() {
        let (service, _clock) = manual(10, 4);

        service.set_in_app_msg_rate(1_000).unwrap();
        drain(&service, Channel::InApp);
        drain(&service, Channel::Push);

        service.init();

        assert_eq!(service.rate(Channel::InApp), 10);
        assert_eq!(service.available_permits(Channel::InApp), 10);
        assert_eq!(service.available_permits(Channel::Push), 4);
        assert_eq!(service.stats().total_acquired(), 0);
    }

    #[test]
    fn test_shutdown_closes_admission_until_init() {
        let (service, _clock) = manual(10, 10);

        service.shutdown();
        service.shutdown();
        assert!(!service.is_running());
        assert!(!service.get_in_app_permit());
        assert!(!service.get_push_permit());

        // Setters still apply while closed
        service.set_push_msg_rate(20).unwrap();
        assert_eq!(service.rate(Channel::Push), 20);

        service.init();
        assert!(service.is_running());
        assert!(service.get_in_app_permit());
        assert_eq!(service.rate(Channel::Push), 10);
    }

    #[test]
    fn test_lifecycle_timestamps() {
        let (service, clock) = manual(10, 10);
        clock.advance(Duration::from_secs(2));
        service.init();
        let stats = service.stats();
        assert_eq!(stats.started_at_ns, 2_000_000_000);
        assert_eq!(stats.stopped_at_ns, None);

        clock.advance(Duration::from_secs(3));
        service.shutdown();
        clock.advance(Duration::from_secs(1));
        // Repeated shutdown keeps the first stop time
        service.shutdown();

        let stats = service.stats();
        assert_eq!(stats.stopped_at_ns, Some(5_000_000_000));
        assert_eq!(stats.uptime(clock.now_nanos()), Duration::from_secs(3));

        clock.advance(Duration::from_secs(1));
        service.init();
        let stats = service.stats();
        assert_eq!(stats.started_at_ns, 7_000_000_000);
        assert_eq!(stats.stopped_at_ns, None);
        assert_eq!(stats.uptime(clock.now_nanos()), Duration::ZERO);
    }

    #[test]
    fn test_with_config_validates() {
        assert!(RateLimiterService::with_config(ThrottleConfig::new(MAX_RATE + 1, 1)).is_err());
    }

    #[test]
    fn test_stats_snapshot() {
        let (service, _clock) = manual(2, 1);
        for _ in 0..3 {
            service.get_in_app_permit();
        }

        let stats = service.stats();
        assert!(stats.running);
        assert_eq!(stats.in_app.total_acquired, 2);
        assert_eq!(stats.in_app.total_rejected, 1);
        assert_eq!(stats.push.current_permits, 1);
    }

    #[test]
    fn test_global_accessor() {
        let first = RateLimiterService::global();
        let second = RateLimiterService::global();
        assert!(std::ptr::eq(first, second));

        assert!(RateLimiterService::init_global(ThrottleConfig::new(1, u32::MAX)).is_err());

        let installed = RateLimiterService::init_global(ThrottleConfig::new(7, 3)).unwrap();
        assert!(std::ptr::eq(first, installed));
        assert_eq!(installed.default_rate(Channel::InApp), 7);
        assert_eq!(installed.rate(Channel::Push), 3);
    }
}
