//! # Throttle Internals
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (Module organization)
//!     ├── bridge.rs       (Property changes → rate setters)
//!     ├── bucket.rs       (Lock-free token bucket)
//!     ├── channel.rs      (InApp / Push)
//!     ├── clock.rs        (System and manual time sources)
//!     ├── config.rs       (Default rates, memory ordering)
//!     ├── error.rs        (InvalidRate)
//!     ├── metrics.rs      (Snapshots and health)
//!     ├── service.rs      (Two-channel service, lifecycle, global)
//!     └── utils.rs        (Backoff, cache alignment, monotonic time)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     PropertyChange          Dispatch path
//!          │                       │
//!          ▼                       │
//!     ┌─────────┐                  │
//!     │ Bridge  │                  │
//!     └────┬────┘                  │
//!          │ set_rate              │ acquire
//!          ▼                       ▼
//!     ┌──────────────────────────────┐
//!     │           Service            │ ◄── init / shutdown
//!     └──────┬────────────────┬──────┘
//!            ▼                ▼
//!     ┌────────────┐   ┌────────────┐
//!     │   Bucket   │   │   Bucket   │ ◄── Clock
//!     │  (in_app)  │   │   (push)   │
//!     └────────────┘   └────────────┘
//! ```

mod bridge;
mod bucket;
mod channel;
mod clock;
mod config;
mod error;
mod metrics;
mod service;
mod utils;

/// Property-change bridge for runtime reconfiguration
pub use bridge::{BridgeOutcome, BridgeReport, ConfigBridge, PropertyChange};

/// Single-channel token bucket
pub use bucket::TokenBucket;

/// Traffic channels and their property keys
pub use channel::{Channel, IN_APP_RATE_PROPERTY, PUSH_RATE_PROPERTY};

/// Time sources
pub use clock::{Clock, ManualClock, SystemClock};

/// Configuration types and defaults
pub use config::{
    MemoryOrdering, ThrottleConfig, DEFAULT_IN_APP_MSG_RATE, DEFAULT_PUSH_MSG_RATE, MAX_RATE,
};

/// Error types
pub use error::{ThrottleError, ThrottleResult};

/// Metrics and health monitoring
pub use metrics::{BucketMetrics, HealthStatus, ServiceStats};

/// The two-channel service
pub use service::RateLimiterService;

/// Spin hint and monotonic time
pub use utils::{cpu_relax, monotonic_nanos};
