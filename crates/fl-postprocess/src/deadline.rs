//! Soft, monotonic deadlines for time-boxed post-processing.

use std::time::{Duration, Instant};

/// A soft deadline measured on the monotonic clock.
///
/// Nothing is interrupted when it passes; work is expected to check
/// [`Deadline::is_expired`] before starting the next unit.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.budget
    }
}
