//! Dispatch workers sharing the throttle while an operator retunes it.
//!
//! Run with: `RUST_LOG=dispatch_throttle=debug cargo run --example dispatch`

use dispatch_throttle::{
    Channel, ConfigBridge, PropertyChange, RateLimiterService, ThrottleConfig,
    IN_APP_RATE_PROPERTY, PUSH_RATE_PROPERTY,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Dispatch Throttle Example ===\n");

    let service = match RateLimiterService::init_global(ThrottleConfig::new(200, 20)) {
        Ok(service) => service,
        Err(err) => {
            eprintln!("invalid throttle config: {}", err);
            return;
        }
    };

    let (changes, receiver) = mpsc::channel();
    let bridge = match ConfigBridge::new(service).spawn(receiver) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("could not start config bridge: {}", err);
            return;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let workers: Vec<_> = [(Channel::InApp, 4), (Channel::Push, 2)]
        .into_iter()
        .flat_map(|(channel, count)| (0..count).map(move |_| channel))
        .map(|channel| {
            let running = running.clone();
            thread::spawn(move || dispatch_loop(service, channel, &running))
        })
        .collect();

    for (phase, (in_app, push)) in [(200, 20), (50, 100), (0, 100)].into_iter().enumerate() {
        println!("Phase {}: in_app {}/s, push {}/s", phase + 1, in_app, push);
        let _ = changes.send(PropertyChange::new(IN_APP_RATE_PROPERTY, in_app));
        let _ = changes.send(PropertyChange::new(PUSH_RATE_PROPERTY, push));
        thread::sleep(Duration::from_secs(1));
        println!("{}\n", service.stats());
    }

    running.store(false, Ordering::Relaxed);
    let mut totals = [(Channel::InApp, 0u64, 0u64), (Channel::Push, 0, 0)];
    for handle in workers {
        if let Ok((channel, sent, deferred)) = handle.join() {
            for entry in totals.iter_mut().filter(|entry| entry.0 == channel) {
                entry.1 += sent;
                entry.2 += deferred;
            }
        }
    }
    for (channel, sent, deferred) in totals {
        println!("{:>6}: {} sent, {} deferred", channel, sent, deferred);
    }

    drop(changes);
    if let Ok(report) = bridge.join() {
        println!("Config bridge: {:?}", report);
    }
    service.shutdown();
}

/// Pretends to deliver messages as fast as the throttle allows.
fn dispatch_loop(
    service: &RateLimiterService,
    channel: Channel,
    running: &AtomicBool,
) -> (Channel, u64, u64) {
    let mut sent = 0;
    let mut deferred = 0;

    while running.load(Ordering::Relaxed) {
        if service.acquire(channel) {
            sent += 1;
        } else {
            // Rejection policy belongs to the caller; this one backs off
            deferred += 1;
            thread::sleep(Duration::from_millis(5));
        }
    }

    (channel, sent, deferred)
}
