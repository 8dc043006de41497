//! Per-run job context shared by the runner, listeners and the traversal engine.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::artifact::ArtifactFactory;
use crate::error::catch_panic;
use crate::repository::JobRepository;
use crate::state_machine::{Job, JobExecution};

/// An instance whose lifetime is bound to one job execution.
pub trait ScopedInstance: Send {
    fn name(&self) -> &str;

    /// Called once when the execution is cleaned up.
    fn destroy(self: Box<Self>);
}

/// Everything one run needs: the job definition, its execution record, and
/// the collaborators the runner talks to.
pub struct JobContext {
    job: Arc<Job>,
    execution: Arc<JobExecution>,
    repository: Arc<dyn JobRepository>,
    artifacts: Arc<dyn ArtifactFactory>,
    transient_user_data: Mutex<Option<Box<dyn Any + Send>>>,
    scoped_instances: Mutex<Vec<Box<dyn ScopedInstance>>>,
}

impl JobContext {
    pub fn new(
        job: Arc<Job>,
        execution: Arc<JobExecution>,
        repository: Arc<dyn JobRepository>,
        artifacts: Arc<dyn ArtifactFactory>,
    ) -> Self {
        Self {
            job,
            execution,
            repository,
            artifacts,
            transient_user_data: Mutex::new(None),
            scoped_instances: Mutex::new(Vec::new()),
        }
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn execution(&self) -> &Arc<JobExecution> {
        &self.execution
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactFactory> {
        &self.artifacts
    }

    pub fn set_exit_status(&self, exit_status: impl Into<String>) {
        self.execution.set_exit_status(exit_status);
    }

    pub fn set_transient_user_data<T: Any + Send>(&self, data: T) {
        *self.transient_user_data.lock() = Some(Box::new(data));
    }

    /// Runs `f` against the transient user data if it is present and of type `T`.
    pub fn with_transient_user_data<T: Any + Send, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let mut guard = self.transient_user_data.lock();
        guard.as_mut().and_then(|data| data.downcast_mut::<T>()).map(f)
    }

    pub fn has_transient_user_data(&self) -> bool {
        self.transient_user_data.lock().is_some()
    }

    pub fn clear_transient_user_data(&self) {
        self.transient_user_data.lock().take();
    }

    pub fn register_scoped_instance(&self, instance: Box<dyn ScopedInstance>) {
        self.scoped_instances.lock().push(instance);
    }

    pub fn scoped_instance_count(&self) -> usize {
        self.scoped_instances.lock().len()
    }

    /// Destroys and forgets every scoped instance. Returns how many were
    /// destroyed; an instance panicking in `destroy` still counts.
    pub fn destroy_scoped_instances(&self) -> usize {
        let instances = std::mem::take(&mut *self.scoped_instances.lock());
        let count = instances.len();
        for instance in instances {
            let name = instance.name().to_string();
            debug!(instance = %name, "destroying job-scoped instance");
            if let Err(err) = catch_panic(move || instance.destroy()) {
                warn!(instance = %name, error = %err, "job-scoped instance destroy panicked");
            }
        }
        count
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job", &self.job.id)
            .field("execution", &self.execution.id())
            .field("scoped_instances", &self.scoped_instance_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactRegistry;
    use crate::repository::InMemoryJobRepository;
    use crate::state_machine::JobParameters;

    struct Counter {
        destroyed: Arc<Mutex<Vec<String>>>,
        name: String,
    }

    impl ScopedInstance for Counter {
        fn name(&self) -> &str {
            &self.name
        }

        fn destroy(self: Box<Self>) {
            self.destroyed.lock().push(self.name.clone());
            if self.name == "leaky" {
                panic!("handle already closed");
            }
        }
    }

    fn context() -> JobContext {
        let job = Arc::new(Job::new("ctx-job"));
        let execution = Arc::new(JobExecution::new(job.clone(), JobParameters::new()));
        JobContext::new(
            job,
            execution,
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(ArtifactRegistry::new()),
        )
    }

    #[test]
    fn transient_user_data_round_trip() {
        let ctx = context();
        assert!(!ctx.has_transient_user_data());

        ctx.set_transient_user_data(41_u32);
        let value = ctx.with_transient_user_data(|n: &mut u32| {
            *n += 1;
            *n
        });
        assert_eq!(value, Some(42));
        assert_eq!(ctx.with_transient_user_data(|s: &mut String| s.len()), None);

        ctx.clear_transient_user_data();
        assert!(!ctx.has_transient_user_data());
    }

    #[test]
    fn scoped_instances_are_destroyed_once_in_registration_order() {
        let ctx = context();
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            ctx.register_scoped_instance(Box::new(Counter {
                destroyed: destroyed.clone(),
                name: name.to_string(),
            }));
        }

        assert_eq!(ctx.destroy_scoped_instances(), 2);
        assert_eq!(ctx.destroy_scoped_instances(), 0);
        assert_eq!(*destroyed.lock(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn panicking_scoped_instance_does_not_stop_the_others() {
        let ctx = context();
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "leaky", "b"] {
            ctx.register_scoped_instance(Box::new(Counter {
                destroyed: destroyed.clone(),
                name: name.to_string(),
            }));
        }

        assert_eq!(ctx.destroy_scoped_instances(), 3);
        assert_eq!(*destroyed.lock(), vec!["a", "leaky", "b"]);
        assert_eq!(ctx.scoped_instance_count(), 0);
    }

    #[test]
    fn exit_status_goes_to_execution() {
        let ctx = context();
        ctx.set_exit_status("ALL GOOD");
        assert_eq!(ctx.execution().exit_status().as_deref(), Some("ALL GOOD"));
    }
}
