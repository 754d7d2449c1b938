//! Admission metrics for one channel bucket and for the whole service.
//!
//! ## Metrics Overview
//!
//! ```text
//!     ServiceStats
//!     ├─ running: true
//!     ├─ in_app ──► BucketMetrics
//!     │             ├─ acquired / rejected / refills
//!     │             ├─ permits 42 / capacity 100
//!     │             └─ health: Healthy
//!     └─ push ────► BucketMetrics
//!                   ├─ acquired / rejected / refills
//!                   ├─ permits 0 / capacity 50
//!                   └─ health: Critical
//! ```

use std::fmt;
use std::time::Duration;

/// Snapshot of one bucket's counters and capacity.
///
/// ## Key Metrics Explained
///
/// ### Admission
/// - **total_acquired**: permits granted
/// - **total_rejected**: acquires answered with `false`
/// - **success_rate**: fraction of acquires granted
///
/// ### Capacity
/// - **current_permits**: whole permits banked at snapshot time
/// - **capacity**: configured permits per second
/// - **total_reconfigurations**: accepted capacity changes
///
/// ### Pressure Indicators
/// - **consecutive_rejections**: current rejection streak
/// - **pressure_ratio**: rejected / total
/// - **cas_retries**: CAS attempts lost to other callers
///
/// ## Example Usage
///
/// ```rust
/// use dispatch_throttle::TokenBucket;
///
/// let bucket = TokenBucket::new(10);
/// for _ in 0..12 {
///     bucket.acquire();
/// }
///
/// let metrics = bucket.metrics();
/// assert_eq!(metrics.total_acquired, 10);
/// assert_eq!(metrics.total_rejected, 2);
/// println!("{}", metrics.summary());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BucketMetrics {
    /// Permits granted.
    pub total_acquired: u64,

    /// Acquires denied because less than one permit was banked.
    pub total_rejected: u64,

    /// Refills that deposited at least one milli-permit.
    pub total_refills: u64,

    /// Accepted capacity changes since construction or the last reset.
    pub total_reconfigurations: u64,

    /// Whole permits banked when the snapshot was taken.
    pub current_permits: u64,

    /// Capacity in permits per second.
    pub capacity: u32,

    /// Rejections since the last successful acquire.
    /// Values above 10 indicate sustained pressure.
    pub consecutive_rejections: u32,

    /// CAS attempts that lost a race and had to retry.
    pub cas_retries: u64,

    /// Ratio of rejected to total acquires (0.0 to 1.0).
    pub pressure_ratio: f64,
}

impl BucketMetrics {
    /// Fraction of acquires granted, `1.0` when nothing was attempted yet.
    #[inline]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            1.0
        } else {
            self.total_acquired as f64 / total as f64
        }
    }

    /// Fraction of acquires denied.
    #[inline]
    pub fn rejection_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }

    /// Total acquire attempts.
    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.total_acquired + self.total_rejected
    }

    /// Share of capacity currently spent: `0.0` full bucket, `1.0` empty.
    ///
    /// A zero-capacity bucket reports `0.0`.
    #[inline]
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            1.0 - (self.current_permits as f64 / f64::from(self.capacity))
        }
    }

    /// Success rate below 50%, or nothing banked right now.
    #[inline]
    pub fn is_under_pressure(&self) -> bool {
        self.success_rate() < 0.5 || self.current_permits == 0
    }

    /// More than 10 consecutive rejections, or over 30% rejected overall.
    #[inline]
    pub fn is_under_sustained_pressure(&self) -> bool {
        self.consecutive_rejections > 10 || self.pressure_ratio > 0.3
    }

    /// Three-level health classification of the pressure indicators.
    pub fn health_status(&self) -> HealthStatus {
        if self.is_under_sustained_pressure() {
            HealthStatus::Critical
        } else if self.is_under_pressure() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Human-readable report for logs.
    ///
    /// # Example Output
    ///
    /// ```text
    /// Bucket Metrics:
    /// ├─ Admission:
    /// │  ├─ Success Rate: 90.91%
    /// │  └─ Rejection Rate: 9.09%
    /// ├─ Capacity:
    /// │  ├─ Available Permits: 12/50
    /// │  ├─ Utilization: 76.00%
    /// │  └─ Reconfigurations: 1
    /// ├─ Counters:
    /// │  ├─ Total Acquired: 30050
    /// │  ├─ Total Rejected: 2950
    /// │  ├─ Total Refills: 32999
    /// │  ├─ Consecutive Rejections: 0
    /// │  └─ CAS Retries: 0
    /// └─ Health: Degraded
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "Bucket Metrics:\n\
             ├─ Admission:\n\
             │  ├─ Success Rate: {:.2}%\n\
             │  └─ Rejection Rate: {:.2}%\n\
             ├─ Capacity:\n\
             │  ├─ Available Permits: {}/{}\n\
             │  ├─ Utilization: {:.2}%\n\
             │  └─ Reconfigurations: {}\n\
             ├─ Counters:\n\
             │  ├─ Total Acquired: {}\n\
             │  ├─ Total Rejected: {}\n\
             │  ├─ Total Refills: {}\n\
             │  ├─ Consecutive Rejections: {}\n\
             │  └─ CAS Retries: {}\n\
             └─ Health: {:?}",
            self.success_rate() * 100.0,
            self.rejection_rate() * 100.0,
            self.current_permits,
            self.capacity,
            self.utilization() * 100.0,
            self.total_reconfigurations,
            self.total_acquired,
            self.total_rejected,
            self.total_refills,
            self.consecutive_rejections,
            self.cas_retries,
            self.health_status(),
        )
    }
}

impl fmt::Display for BucketMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Health status indicator for a channel.
///
/// ```text
///     Healthy ──────► Normal operation, permits available
///        │
///     Degraded ─────► Bucket drained or most acquires denied
///        │
///     Critical ─────► Sustained denial, producers outpace capacity
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Permits available and most acquires granted.
    Healthy,

    /// Bucket empty or success rate below 50%.
    Degraded,

    /// Over 30% rejected overall or more than 10 rejections in a row.
    Critical,
}

impl HealthStatus {
    /// Returns true for anything but `Healthy`.
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// Short operator guidance for the status.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::Healthy => "No action needed",
            Self::Degraded => "Monitor closely, consider raising the channel rate",
            Self::Critical => "Immediate action required: raise the rate or shed producer load",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "✅ Healthy"),
            Self::Degraded => write!(f, "⚠️ Degraded"),
            Self::Critical => write!(f, "🔴 Critical"),
        }
    }
}

/// Metrics for both channels plus service state.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStats {
    /// Whether admission is open (`init` called and no `shutdown` since).
    pub running: bool,

    /// Clock reading at construction or at the latest `init`.
    pub started_at_ns: u64,

    /// Clock reading at the latest `shutdown`, cleared by `init`.
    pub stopped_at_ns: Option<u64>,

    /// In-app message channel.
    pub in_app: BucketMetrics,

    /// Push notification channel.
    pub push: BucketMetrics,
}

impl ServiceStats {
    /// Permits granted across both channels.
    pub fn total_acquired(&self) -> u64 {
        self.in_app.total_acquired + self.push.total_acquired
    }

    /// Acquires denied across both channels.
    pub fn total_rejected(&self) -> u64 {
        self.in_app.total_rejected + self.push.total_rejected
    }

    /// Time admission has been open as of `now_ns`, or was open before the
    /// latest `shutdown`.
    pub fn uptime(&self, now_ns: u64) -> Duration {
        let end = self.stopped_at_ns.unwrap_or(now_ns);
        Duration::from_nanos(end.saturating_sub(self.started_at_ns))
    }

    /// The worse of the two channels' health.
    pub fn health_status(&self) -> HealthStatus {
        match (self.in_app.health_status(), self.push.health_status()) {
            (HealthStatus::Critical, _) | (_, HealthStatus::Critical) => HealthStatus::Critical,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }

    /// One-screen report covering both channels.
    pub fn summary(&self) -> String {
        format!(
            "Throttle Service Stats:\n\
             ├─ Running: {}\n\
             ├─ Started: {}ns{}\n\
             ├─ In-App: {}/{} permits, {} acquired, {} rejected, {:?}\n\
             └─ Push:   {}/{} permits, {} acquired, {} rejected, {:?}",
            self.running,
            self.started_at_ns,
            match self.stopped_at_ns {
                Some(stopped) => format!(", stopped: {}ns", stopped),
                None => String::new(),
            },
            self.in_app.current_permits,
            self.in_app.capacity,
            self.in_app.total_acquired,
            self.in_app.total_rejected,
            self.in_app.health_status(),
            self.push.current_permits,
            self.push.capacity,
            self.push.total_acquired,
            self.push.total_rejected,
            self.push.health_status(),
        )
    }
}

impl fmt::Display for ServiceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(acquired: u64, rejected: u64, permits: u64, capacity: u32, streak: u32) -> BucketMetrics {
        let total = acquired + rejected;
        BucketMetrics {
            total_acquired: acquired,
            total_rejected: rejected,
            total_refills: 0,
            total_reconfigurations: 0,
            current_permits: permits,
            capacity,
            consecutive_rejections: streak,
            cas_retries: 0,
            pressure_ratio: if total == 0 { 0.0 } else { rejected as f64 / total as f64 },
        }
    }

    #[test]
    fn test_metrics_calculations() {
        let metrics = snapshot(80, 20, 25, 100, 5);

        assert_eq!(metrics.success_rate(), 0.8);
        assert_eq!(metrics.total_requests(), 100);
        assert_eq!(metrics.utilization(), 0.75);
        assert!(!metrics.is_under_pressure());
        assert_eq!(metrics.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_status() {
        let metrics = snapshot(40, 60, 0, 100, 15);

        assert!(metrics.is_under_pressure());
        assert!(metrics.is_under_sustained_pressure());
        assert_eq!(metrics.health_status(), HealthStatus::Critical);

        let drained = snapshot(50, 0, 0, 50, 0);
        assert_eq!(drained.health_status(), HealthStatus::Degraded);
    }

    #[test]
    fn test_edge_cases() {
        let idle = snapshot(0, 0, 50, 100, 0);
        assert_eq!(idle.success_rate(), 1.0);
        assert_eq!(idle.utilization(), 0.5);
        assert!(!idle.is_under_pressure());

        let closed = snapshot(0, 0, 0, 0, 0);
        assert_eq!(closed.utilization(), 0.0);
    }

    #[test]
    fn test_health_status_methods() {
        assert!(!HealthStatus::Healthy.is_unhealthy());
        assert!(HealthStatus::Degraded.is_unhealthy());
        assert!(HealthStatus::Critical.is_unhealthy());

        assert_eq!(HealthStatus::Healthy.suggested_action(), "No action needed");
        assert!(HealthStatus::Degraded.suggested_action().contains("Monitor"));
        assert!(HealthStatus::Critical.suggested_action().contains("Immediate"));
        assert!(format!("{}", HealthStatus::Critical).contains("Critical"));
    }

    #[test]
    fn test_metrics_display() {
        let metrics = snapshot(100, 20, 30, 100, 0);

        let display = format!("{}", metrics);
        assert!(display.contains("Bucket Metrics"));
        assert!(display.contains("Available Permits: 30/100"));
        assert!(display.contains("Health"));
    }

    #[test]
    fn test_service_stats_aggregation() {
        let stats = ServiceStats {
            running: true,
            started_at_ns: 5_000,
            stopped_at_ns: None,
            in_app: snapshot(90, 10, 40, 100, 0),
            push: snapshot(10, 90, 0, 50, 30),
        };

        assert_eq!(stats.total_acquired(), 100);
        assert_eq!(stats.total_rejected(), 100);
        assert_eq!(stats.health_status(), HealthStatus::Critical);

        let summary = stats.summary();
        assert!(summary.contains("Running: true"));
        assert!(summary.contains("In-App: 40/100"));
        assert!(summary.contains("Push:   0/50"));
        assert!(summary.contains("Started: 5000ns\n"));
    }

    #[test]
    fn test_service_uptime() {
        let mut stats = ServiceStats {
            running: true,
            started_at_ns: 1_000,
            stopped_at_ns: None,
            in_app: snapshot(0, 0, 100, 100, 0),
            push: snapshot(0, 0, 50, 50, 0),
        };
        assert_eq!(stats.uptime(3_000), Duration::from_nanos(2_000));

        stats.running = false;
        stats.stopped_at_ns = Some(1_500);
        assert_eq!(stats.uptime(3_000), Duration::from_nanos(500));
        assert!(stats.summary().contains("Started: 1000ns, stopped: 1500ns"));
    }
}
