use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

use crate::lifecycle::ErrorKind;

/// In-process transition counters
#[derive(Debug, Default)]
pub struct TransitionMetrics {
    pub attempts: AtomicU64,
    pub successes: AtomicU64,
    pub rejected: AtomicU64,
    pub failures: AtomicU64,
    pub rollbacks: AtomicU64,
}

impl TransitionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Validation and state errors: nothing was touched
    pub fn record_failure(&self, kind: ErrorKind) {
        match kind {
            ErrorKind::Validation | ErrorKind::State => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> TransitionStats {
        TransitionStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Transition metrics: attempts={}, successes={}, rejected={}, failures={}, rollbacks={}",
            stats.attempts, stats.successes, stats.rejected, stats.failures, stats.rollbacks
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionStats {
    pub attempts: u64,
    pub successes: u64,
    pub rejected: u64,
    pub failures: u64,
    pub rollbacks: u64,
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}
