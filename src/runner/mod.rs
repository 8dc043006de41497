//! The job execution runner: drives one execution from its entry status to a
//! terminal status.
//!
//! A run goes through these phases, in order:
//!
//! 1. entry check: an execution already `STOPPING` skips straight to finalization
//! 2. `STARTED` is persisted (partial update)
//! 3. listeners are built, before-hooks run, the traversal runs, after-hooks run
//! 4. the final status is resolved and restart bookkeeping applied
//! 5. the final record is persisted
//! 6. cleanup
//!
//! Failures in phase 3 are contained and turn the execution `FAILED`. Nothing
//! escapes [`JobExecutionRunner::run`], panics included.

mod cleanup;
mod listeners;
mod restart;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::context::JobContext;
use crate::error::{BatchError, catch_panic};
use crate::executor::JobTask;
use crate::report::{FailureSink, TracingFailureSink};
use crate::state_machine::BatchStatus;
use crate::traversal::Traversal;
use listeners::JobListeners;

/// Permits a job run takes from the executor, against one for a plain task.
pub const JOB_RUN_PERMITS: usize = 2;

pub struct JobExecutionRunner {
    // Job, execution record and collaborators of this run.
    ctx: JobContext,
    // Engine running the job's elements.
    traversal: Box<dyn Traversal>,
    // Where contained failures are reported.
    sink: Arc<dyn FailureSink>,
}

impl JobExecutionRunner {
    pub fn new(ctx: JobContext, traversal: impl Traversal + 'static) -> Self {
        Self {
            ctx,
            traversal: Box::new(traversal),
            sink: Arc::new(TracingFailureSink),
        }
    }

    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    /// Runs the job to a terminal status. Never fails and never panics on
    /// behalf of listeners or the traversal.
    pub fn run(&self) {
        let execution = self.ctx.execution();
        info!(job = %self.ctx.job().id, "job run: {}", execution.dump());

        // A stop may have been requested right after the execution was created.
        if execution.batch_status() == BatchStatus::Stopping {
            debug!(job = %self.ctx.job().id, "stopped before start, skipping job body");
        } else {
            execution.set_batch_status(BatchStatus::Started);
            self.persist(false, false);
            self.run_body();
        }

        let parameters_changed = self.finalize_status();
        self.persist(true, parameters_changed);
        cleanup::clean_up(&self.ctx);

        info!(
            job = %self.ctx.job().id,
            execution = %execution.id(),
            status = %execution.batch_status(),
            "job run finished"
        );
    }

    fn run_body(&self) {
        let job_id = &self.ctx.job().id;
        let execution = self.ctx.execution();

        let mut listeners = match JobListeners::create(&self.ctx) {
            Ok(listeners) => listeners,
            Err(err) => {
                // No listener exists that could set a more specific exit status.
                self.report(&err);
                execution.set_batch_status(BatchStatus::Failed);
                execution.set_exit_status(err.to_string());
                return;
            }
        };
        debug!(job = %job_id, listeners = listeners.len(), "created job listeners");

        match listeners.before_job(&self.ctx).and_then(|()| self.traverse()) {
            Ok(()) => {
                let (status, stop_requested) = execution.status_snapshot();
                if stop_requested {
                    execution.set_batch_status(BatchStatus::Stopped);
                } else if status == BatchStatus::Started {
                    execution.set_batch_status(BatchStatus::Completed);
                }
            }
            Err(err) => {
                // Failure takes precedence over a pending stop request.
                self.report(&err);
                execution.set_batch_status(BatchStatus::Failed);
            }
        }

        listeners.after_job(&self.ctx, self.sink.as_ref());
        listeners.destroy(&self.ctx);
    }

    fn traverse(&self) -> Result<(), BatchError> {
        let restart_position = self.ctx.execution().restart_position();
        debug!(job = %self.ctx.job().id, from = %restart_position, "traversing job elements");
        catch_panic(|| self.traversal.run(&self.ctx, &restart_position))
            .and_then(|result| result)
            .map_err(|source| BatchError::Execution { source })
    }

    /// Resolves the terminal status. Returns whether job parameters changed.
    fn finalize_status(&self) -> bool {
        let job = self.ctx.job();
        let execution = self.ctx.execution();

        match execution.batch_status() {
            BatchStatus::Completed => false,
            BatchStatus::Started => {
                execution.set_batch_status(BatchStatus::Completed);
                false
            }
            BatchStatus::Stopping => {
                execution.set_batch_status(BatchStatus::Stopped);
                restart::adjust_restart_failed_or_stopped(job, execution)
            }
            BatchStatus::Stopped | BatchStatus::Failed => {
                restart::adjust_restart_failed_or_stopped(job, execution)
            }
            BatchStatus::Starting => {
                warn!(job = %job.id, "job execution still STARTING after run");
                false
            }
        }
    }

    /// Saves the execution record. Failures are logged and never abort the run.
    fn persist(&self, is_final: bool, parameters_changed: bool) {
        let execution = self.ctx.execution();
        let repository = self.ctx.repository();
        let update = || repository.update_job_execution(execution, is_final, parameters_changed);
        if let Err(err) = catch_panic(update).and_then(|result| Ok(result?)) {
            error!(
                job = %self.ctx.job().id,
                execution = %execution.id(),
                is_final,
                error = %err,
                "failed to persist job execution"
            );
        }
    }

    fn report(&self, err: &BatchError) {
        let job_id = self.ctx.job().id.as_str();
        let component = err.component().unwrap_or(job_id);
        report_failure(self.sink.as_ref(), job_id, "job", component, err);
    }
}

impl JobTask for JobExecutionRunner {
    fn required_remaining_permits(&self) -> usize {
        JOB_RUN_PERMITS
    }

    fn run(&self) {
        JobExecutionRunner::run(self);
    }
}

/// Hands a failure to the sink. A panicking sink is logged and otherwise ignored.
pub(crate) fn report_failure(
    sink: &dyn FailureSink,
    job_id: &str,
    context: &str,
    component: &str,
    err: &BatchError,
) {
    if catch_panic(|| sink.report(job_id, context, component, err)).is_err() {
        warn!(job = job_id, context, component, "failure sink panicked");
    }
}
