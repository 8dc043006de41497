//! Failure reporting.

use parking_lot::Mutex;
use tracing::error;

use crate::error::BatchError;

/// Receives failures raised while running a job. Reporting never affects the
/// outcome of the run.
pub trait FailureSink: Send + Sync {
    fn report(&self, job_id: &str, context: &str, component: &str, error: &BatchError);
}

/// Logs failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFailureSink;

impl FailureSink for TracingFailureSink {
    fn report(&self, job_id: &str, context: &str, component: &str, error: &BatchError) {
        error!(
            job = job_id,
            context,
            component,
            error = %error,
            "failed to run job {job_id}"
        );
    }
}

/// One reported failure, as kept by [`CollectingFailureSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub job_id: String,
    pub context: String,
    pub component: String,
    pub message: String,
}

/// Keeps every report in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingFailureSink {
    reports: Mutex<Vec<FailureReport>>,
}

impl CollectingFailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().clone()
    }
}

impl FailureSink for CollectingFailureSink {
    fn report(&self, job_id: &str, context: &str, component: &str, error: &BatchError) {
        self.reports.lock().push(FailureReport {
            job_id: job_id.to_string(),
            context: context.to_string(),
            component: component.to_string(),
            message: error.to_string(),
        });
    }
}
