//! Restart bookkeeping for failed and stopped executions.

use tracing::debug;

use crate::state_machine::{DEFINITION_NAME_PARAM, Job, JobExecution, RestartPosition};

/// Adjusts restart position and definition name of a `Failed` or `Stopped`
/// execution. Returns `true` when the definition name was recorded as a job
/// parameter, i.e. parameters must be persisted.
///
/// Applying it again with the same inputs leaves the parameters unchanged.
pub(crate) fn adjust_restart_failed_or_stopped(job: &Job, execution: &JobExecution) -> bool {
    if !job.restartable {
        debug!(job = %job.id, "job is not restartable");
        execution.set_restart_position(RestartPosition::Unrestartable);
    }

    // A restart must be able to find the definition again even when the job
    // is no longer cached under its id.
    match job.distinct_definition_name() {
        Some(name) => {
            execution.set_parameter(DEFINITION_NAME_PARAM, name);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state_machine::JobParameters;

    fn execution(job: &Job) -> JobExecution {
        let params: JobParameters = [("date", "2026-10-17")].into_iter().collect();
        JobExecution::new(Arc::new(job.clone()), params)
    }

    #[test]
    fn unrestartable_job_gets_sentinel() {
        let job = Job::new("j").restartable(false);
        let exec = execution(&job);
        exec.set_restart_position(RestartPosition::At("step3".into()));

        assert!(!adjust_restart_failed_or_stopped(&job, &exec));
        assert_eq!(exec.restart_position(), RestartPosition::Unrestartable);
    }

    #[test]
    fn restartable_job_keeps_checkpoint() {
        let job = Job::new("j");
        let exec = execution(&job);
        exec.set_restart_position(RestartPosition::At("step3".into()));

        assert!(!adjust_restart_failed_or_stopped(&job, &exec));
        assert_eq!(exec.restart_position(), RestartPosition::At("step3".into()));
        assert_eq!(exec.parameters().len(), 1);
    }

    #[test]
    fn distinct_definition_name_is_recorded() {
        let job = Job::new("j").definition_name("j-definition");
        let exec = execution(&job);

        assert!(adjust_restart_failed_or_stopped(&job, &exec));
        assert_eq!(
            exec.parameters().get(DEFINITION_NAME_PARAM),
            Some("j-definition")
        );
    }

    #[test]
    fn definition_name_equal_to_id_is_not_recorded() {
        let job = Job::new("j").definition_name("j");
        let exec = execution(&job);

        assert!(!adjust_restart_failed_or_stopped(&job, &exec));
        assert_eq!(exec.parameters().get(DEFINITION_NAME_PARAM), None);
    }

    #[test]
    fn adjusting_twice_is_idempotent() {
        let job = Job::new("j").restartable(false).definition_name("other");
        let exec = execution(&job);

        adjust_restart_failed_or_stopped(&job, &exec);
        let once = exec.parameters();
        adjust_restart_failed_or_stopped(&job, &exec);
        let twice = exec.parameters();

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 2);
        assert_eq!(exec.restart_position(), RestartPosition::Unrestartable);
    }
}
