//! Workload drivers for exercising the throttle under burst and steady load.
//!
//! Virtual-time drivers advance a [`ManualClock`](dispatch_throttle::ManualClock)
//! between attempts, so multi-minute scenarios run in milliseconds and give
//! exact, repeatable counts. Threads are always joined, never polled.

#![allow(dead_code)]

pub mod generators;
pub mod metrics;

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
