//! Traversal of job elements.
//!
//! The runner delegates the actual work of a job to a [`Traversal`] and
//! treats it as one blocking call. [`SequentialTraversal`] is the bundled
//! engine: it runs registered step functions in element order on the
//! calling thread.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use tracing::{debug, info};

use crate::context::JobContext;
use crate::state_machine::{BatchStatus, JobElement, RestartPosition};

/// Executes a job's elements from the head or from a restart position.
///
/// When a stop was requested the implementation must leave the execution in
/// `Stopping` or `Stopped` and return `Ok`; stopping is not an error.
pub trait Traversal: Send + Sync {
    fn run(&self, ctx: &JobContext, restart_position: &RestartPosition) -> anyhow::Result<()>;
}

impl<F> Traversal for F
where
    F: Fn(&JobContext, &RestartPosition) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, ctx: &JobContext, restart_position: &RestartPosition) -> anyhow::Result<()> {
        self(ctx, restart_position)
    }
}

pub type StepFn = Arc<dyn Fn(&JobContext) -> anyhow::Result<()> + Send + Sync>;

/// Runs steps one at a time. Flows run their elements in order; splits run
/// their flows one after another.
///
/// Stop requests are honoured between top-level elements: the execution is
/// marked `Stopped` and the restart position set to the element that did
/// not run. A failing step records its top-level element as restart position.
#[derive(Clone, Default)]
pub struct SequentialTraversal {
    steps: HashMap<String, StepFn>,
}

impl SequentialTraversal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step<F>(mut self, id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&JobContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.steps.insert(id.into(), Arc::new(f));
        self
    }

    fn run_element(&self, ctx: &JobContext, element: &JobElement) -> anyhow::Result<()> {
        match element {
            JobElement::Step { id } => {
                let step = self
                    .steps
                    .get(id)
                    .ok_or_else(|| anyhow!("no step registered for element '{id}'"))?;
                debug!(job = %ctx.job().id, step = %id, "running step");
                step(ctx).with_context(|| format!("step '{id}' failed"))
            }
            JobElement::Flow { elements, .. } => elements
                .iter()
                .try_for_each(|element| self.run_element(ctx, element)),
            JobElement::Split { flows, .. } => flows
                .iter()
                .try_for_each(|flow| self.run_element(ctx, flow)),
        }
    }
}

impl Traversal for SequentialTraversal {
    fn run(&self, ctx: &JobContext, restart_position: &RestartPosition) -> anyhow::Result<()> {
        let elements = &ctx.job().elements;
        let execution = ctx.execution();

        let start = match restart_position {
            RestartPosition::Head => 0,
            RestartPosition::At(id) => elements
                .iter()
                .position(|element| element.id() == id)
                .ok_or_else(|| anyhow!("restart position '{id}' is not a job element"))?,
            RestartPosition::Unrestartable => {
                bail!("job execution of '{}' is not restartable", ctx.job().id)
            }
        };
        if start > 0 {
            info!(job = %ctx.job().id, from = %elements[start].id(), "restarting job");
        }

        for element in &elements[start..] {
            if execution.is_stop_requested() {
                info!(
                    job = %ctx.job().id,
                    next = %element.id(),
                    "stop requested, not running further elements"
                );
                execution.set_restart_position(RestartPosition::At(element.id().to_string()));
                execution.set_batch_status(BatchStatus::Stopped);
                return Ok(());
            }

            if let Err(err) = self.run_element(ctx, element) {
                execution.set_restart_position(RestartPosition::At(element.id().to_string()));
                return Err(err);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SequentialTraversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut steps: Vec<&String> = self.steps.keys().collect();
        steps.sort();
        f.debug_struct("SequentialTraversal")
            .field("steps", &steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::artifact::ArtifactRegistry;
    use crate::repository::InMemoryJobRepository;
    use crate::state_machine::{Job, JobExecution, JobParameters};

    fn context(job: Job) -> JobContext {
        let job = Arc::new(job);
        let execution = Arc::new(JobExecution::new(job.clone(), JobParameters::new()));
        execution.set_batch_status(BatchStatus::Started);
        JobContext::new(
            job,
            execution,
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(ArtifactRegistry::new()),
        )
    }

    fn recording(ids: &[&str], log: &Arc<Mutex<Vec<String>>>) -> SequentialTraversal {
        ids.iter().fold(SequentialTraversal::new(), |traversal, id| {
            let log = log.clone();
            let name = id.to_string();
            traversal.step(*id, move |_| {
                log.lock().push(name.clone());
                Ok(())
            })
        })
    }

    #[test]
    fn runs_nested_elements_in_order() {
        let job = Job::new("j").step("a").element(JobElement::Split {
            id: "split".into(),
            flows: vec![
                JobElement::Flow {
                    id: "f1".into(),
                    elements: vec![JobElement::step("b"), JobElement::step("c")],
                },
                JobElement::Flow {
                    id: "f2".into(),
                    elements: vec![JobElement::step("d")],
                },
            ],
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        let traversal = recording(&["a", "b", "c", "d"], &log);

        traversal.run(&context(job), &RestartPosition::Head).unwrap();
        assert_eq!(*log.lock(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn resumes_from_restart_position() {
        let job = Job::new("j").step("a").step("b").step("c");
        let log = Arc::new(Mutex::new(Vec::new()));
        let traversal = recording(&["a", "b", "c"], &log);

        traversal
            .run(&context(job), &RestartPosition::At("b".into()))
            .unwrap();
        assert_eq!(*log.lock(), vec!["b", "c"]);
    }

    #[test]
    fn unknown_restart_position_fails() {
        let job = Job::new("j").step("a");
        let traversal = recording(&["a"], &Arc::new(Mutex::new(Vec::new())));
        let err = traversal
            .run(&context(job), &RestartPosition::At("zzz".into()))
            .unwrap_err();
        assert!(err.to_string().contains("zzz"));
    }

    #[test]
    fn unrestartable_position_is_refused() {
        let job = Job::new("j").step("a");
        let traversal = recording(&["a"], &Arc::new(Mutex::new(Vec::new())));
        assert!(
            traversal
                .run(&context(job), &RestartPosition::Unrestartable)
                .is_err()
        );
    }

    #[test]
    fn stop_request_halts_before_next_element() {
        let job = Job::new("j").step("a").step("b");
        let traversal = SequentialTraversal::new()
            .step("a", |ctx: &JobContext| {
                ctx.execution().request_stop();
                Ok(())
            })
            .step("b", |_: &JobContext| bail!("must not run"));
        let ctx = context(job);

        traversal.run(&ctx, &RestartPosition::Head).unwrap();
        assert_eq!(ctx.execution().batch_status(), BatchStatus::Stopped);
        assert_eq!(
            ctx.execution().restart_position(),
            RestartPosition::At("b".into())
        );
    }

    #[test]
    fn failing_step_records_restart_position() {
        let job = Job::new("j").step("a").step("b");
        let traversal = SequentialTraversal::new()
            .step("a", |_: &JobContext| Ok(()))
            .step("b", |_: &JobContext| bail!("disk full"));
        let ctx = context(job);

        let err = traversal.run(&ctx, &RestartPosition::Head).unwrap_err();
        assert!(format!("{err:#}").contains("disk full"));
        assert_eq!(
            ctx.execution().restart_position(),
            RestartPosition::At("b".into())
        );
    }

    #[test]
    fn missing_step_is_an_error() {
        let job = Job::new("j").step("ghost");
        let err = SequentialTraversal::new()
            .run(&context(job), &RestartPosition::Head)
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn closures_are_traversals() {
        let job = Job::new("j");
        let traversal = |_: &JobContext, position: &RestartPosition| -> anyhow::Result<()> {
            assert_eq!(*position, RestartPosition::Head);
            Ok(())
        };
        Traversal::run(&traversal, &context(job), &RestartPosition::Head).unwrap();
    }
}
