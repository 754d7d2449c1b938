//! Outcome tallies for workload runs.

use std::fmt;

/// Successes and failures observed by a driver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub successes: u64,
    pub failures: u64,
}

impl Tally {
    /// Create an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt.
    pub fn record(&mut self, granted: bool) {
        if granted {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }

    /// Attempts recorded.
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Failures as a percentage of attempts, `0.0` for an empty tally.
    pub fn failure_percentage(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.failures as f64 * 100.0 / self.total() as f64
        }
    }

    /// Expected failure percentage for a steady `rate` against `capacity`.
    pub fn expected_overload_percentage(rate: u32, capacity: u32) -> f64 {
        if rate <= capacity {
            0.0
        } else {
            f64::from(rate - capacity) * 100.0 / f64::from(rate)
        }
    }
}

impl FromIterator<bool> for Tally {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for granted in iter {
            tally.record(granted);
        }
        tally
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts, {} granted, {} denied ({:.2}% failure)",
            self.total(),
            self.successes,
            self.failures,
            self.failure_percentage()
        )
    }
}
