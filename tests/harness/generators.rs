//! Burst and steady-rate workload generators.

use super::metrics::Tally;
use dispatch_throttle::ManualClock;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Interval between attempts for a steady `per_second` rate.
pub fn step_for_rate(per_second: u32) -> Duration {
    Duration::from_nanos(NANOS_PER_SECOND / u64::from(per_second.max(1)))
}

/// Releases `callers` threads at once; each makes a single attempt.
///
/// Every thread parks on a barrier before calling `attempt`, so all calls
/// land as close together as the scheduler allows. Returns after every
/// thread has been joined.
pub fn burst<F>(callers: usize, attempt: F) -> Tally
where
    F: Fn() -> bool + Sync,
{
    let barrier = Barrier::new(callers);
    thread::scope(|scope| {
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    attempt()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("burst caller panicked"))
            .collect()
    })
}

/// Makes `per_second` attempts per virtual second for `duration`.
///
/// The first attempt happens at the clock's current reading; the clock is
/// advanced by one step after each attempt.
pub fn steady_virtual<F>(clock: &ManualClock, per_second: u32, duration: Duration, mut attempt: F) -> Tally
where
    F: FnMut() -> bool,
{
    let step = step_for_rate(per_second);
    let attempts = duration.as_secs() * u64::from(per_second);

    let mut tally = Tally::new();
    for _ in 0..attempts {
        tally.record(attempt());
        clock.advance(step);
    }
    tally
}

/// Makes `per_second` attempts per wall-clock second for `duration`.
///
/// Attempts are scheduled against fixed deadlines, so a late wake-up does
/// not push later attempts back. Sleeps between attempts.
pub fn steady_real_time<F>(per_second: u32, duration: Duration, mut attempt: F) -> Tally
where
    F: FnMut() -> bool,
{
    let step = step_for_rate(per_second);
    let start = Instant::now();
    let mut next = start;

    let mut tally = Tally::new();
    while next.duration_since(start) < duration {
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        tally.record(attempt());
        next += step;
    }
    tally
}
