//! Performance budgets for friendrec operations.
//!
//! A recommendation is a full O(N·D) scan of the store, so its latency grows
//! with the number of students. Rather than aborting slow calls, every
//! recommendation is timed against [`RECOMMEND`] and logs a warning when it
//! runs long. `friendrec doctor` reports the same budget.
//!
//! | Budget | Target | Warning | Panic | Notes |
//! |--------|--------|---------|-------|-------|
//! | `recommend` | 1ms | 10ms | 100ms | ~10⁵ users × 32 dims on one core |
//! | `store_load` | 100ms | 1s | 10s | one-time startup |
//! | `directory_load` | 10ms | 100ms | 1s | one-time startup |

use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Performance budget for an operation.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// Name of the operation.
    pub name: &'static str,
    /// Target latency (expected p99).
    pub target: Duration,
    /// Warning threshold (log warning if exceeded).
    pub warning: Duration,
    /// Panic threshold (reported as critical, never enforced).
    pub panic: Duration,
}

impl Budget {
    /// Create a new budget with the given thresholds.
    #[must_use]
    pub const fn new(name: &'static str, target_ms: u64, warning_ms: u64, panic_ms: u64) -> Self {
        Self {
            name,
            target: Duration::from_millis(target_ms),
            warning: Duration::from_millis(warning_ms),
            panic: Duration::from_millis(panic_ms),
        }
    }

    /// Check if a duration exceeds the panic threshold.
    #[must_use]
    pub fn exceeds_panic(&self, duration: Duration) -> bool {
        duration > self.panic
    }

    /// Get the status of a duration relative to this budget.
    #[must_use]
    pub fn status(&self, duration: Duration) -> BudgetStatus {
        if duration <= self.target {
            BudgetStatus::OnTarget
        } else if duration <= self.warning {
            BudgetStatus::Acceptable
        } else if duration <= self.panic {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Exceeded
        }
    }
}

/// Status of an operation relative to its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    /// Duration is within target.
    OnTarget,
    /// Duration exceeds target but is acceptable.
    Acceptable,
    /// Duration exceeds warning threshold.
    Warning,
    /// Duration exceeds panic threshold.
    Exceeded,
}

impl BudgetStatus {
    /// Check if this status is acceptable for production.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::OnTarget | Self::Acceptable)
    }
}

/// Budget for a single recommendation (similarity scan + top-k).
pub const RECOMMEND: Budget = Budget::new("recommend", 1, 10, 100);

/// Budget for loading the embedding file.
pub const STORE_LOAD: Budget = Budget::new("store_load", 100, 1000, 10_000);

/// Budget for loading the user directory CSV.
pub const DIRECTORY_LOAD: Budget = Budget::new("directory_load", 10, 100, 1000);

/// A timer that tracks operation duration and checks against a budget.
#[derive(Debug)]
pub struct Timer {
    budget: Budget,
    start: Instant,
}

impl Timer {
    /// Start a new timer for the given budget.
    #[must_use]
    pub fn start(budget: Budget) -> Self {
        Self {
            budget,
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration.
    /// Logs a warning if the budget was exceeded.
    #[allow(clippy::needless_pass_by_value)]
    pub fn stop(self) -> Duration {
        let duration = self.elapsed();

        match self.budget.status(duration) {
            BudgetStatus::OnTarget | BudgetStatus::Acceptable => {
                debug!(
                    operation = self.budget.name,
                    duration_us = duration.as_micros(),
                    "Operation completed"
                );
            }
            BudgetStatus::Warning => {
                warn!(
                    operation = self.budget.name,
                    duration_ms = duration.as_millis(),
                    warning_ms = self.budget.warning.as_millis(),
                    "Operation exceeded warning threshold"
                );
            }
            BudgetStatus::Exceeded => {
                warn!(
                    operation = self.budget.name,
                    duration_ms = duration.as_millis(),
                    panic_ms = self.budget.panic.as_millis(),
                    "Operation exceeded panic threshold - CRITICAL"
                );
            }
        }

        duration
    }
}

/// Convenience macro for timing an operation.
#[macro_export]
macro_rules! timed {
    ($budget:expr, $expr:expr) => {{
        let timer = $crate::perf::Timer::start($budget);
        let result = $expr;
        timer.stop();
        result
    }};
}
