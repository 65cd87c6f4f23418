//! Per-entry outcomes of batch operations.

use resvault_common::Error;

/// One entry that failed inside a batch.
#[derive(Debug)]
pub struct BatchFailure {
    /// Entry name or source path.
    pub name: String,
    /// What went wrong.
    pub error: Error,
}

/// Result of a multi-entry operation that continues past failures.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Names that completed, in processing order.
    pub succeeded: Vec<String>,
    /// Names that failed, in processing order.
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a success.
    pub fn record_success(&mut self, name: impl Into<String>) {
        self.succeeded.push(name.into());
    }

    /// Record a failure.
    pub fn record_failure(&mut self, name: impl Into<String>, error: Error) {
        self.failed.push(BatchFailure {
            name: name.into(),
            error,
        });
    }

    /// Number of entries processed.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether every entry succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
