//! Built-in demo jobs used by the `demo` command.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tracing::info;

use crate::artifact::{ArtifactRegistry, JobListener};
use crate::context::JobContext;
use crate::error::Result;
use crate::repository::JobRepository;
use crate::runner::JobExecutionRunner;
use crate::state_machine::{Job, JobExecution, JobParameters, ListenerRef, Properties};
use crate::traversal::SequentialTraversal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Every listener and step succeeds.
    Happy,
    /// A before-hook fails, so no step runs.
    ListenerFailure,
    /// The second step fails; the job can be restarted from it.
    StepFailure,
    /// Like `StepFailure`, but the job is not restartable.
    Unrestartable,
    /// Meant to be stopped while running.
    Stop,
    /// A listener reference nothing is registered under.
    BrokenListener,
}

impl Scenario {
    pub fn all() -> &'static [Scenario] {
        &[
            Scenario::Happy,
            Scenario::ListenerFailure,
            Scenario::StepFailure,
            Scenario::Unrestartable,
            Scenario::Stop,
            Scenario::BrokenListener,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Happy => "happy",
            Scenario::ListenerFailure => "listener-failure",
            Scenario::StepFailure => "step-failure",
            Scenario::Unrestartable => "unrestartable",
            Scenario::Stop => "stop",
            Scenario::BrokenListener => "broken-listener",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Scenario::Happy => "all listeners and steps succeed",
            Scenario::ListenerFailure => "a before-hook fails, no step runs",
            Scenario::StepFailure => "the transform step fails, restartable from it",
            Scenario::Unrestartable => "the transform step fails in a non-restartable job",
            Scenario::Stop => "the job is stopped while it runs",
            Scenario::BrokenListener => "a listener cannot be constructed",
        }
    }

    pub fn job(self) -> Job {
        let transform = match self {
            Scenario::StepFailure | Scenario::Unrestartable => "transform-unstable",
            _ => "transform",
        };
        let base = Job::new("nightly-report")
            .step("extract")
            .step(transform)
            .step("load")
            .listener(ListenerRef::new("loggingListener"));

        match self {
            Scenario::Happy | Scenario::StepFailure => {
                base.listener(ListenerRef::new("exitStatusListener"))
            }
            Scenario::ListenerFailure => base
                .listener(ListenerRef::new("failingListener").with_property("phase", "before"))
                .listener(ListenerRef::new("exitStatusListener")),
            Scenario::Unrestartable => base.restartable(false),
            Scenario::Stop => base
                .definition_name("nightly-report-v2")
                .listener(ListenerRef::new("exitStatusListener")),
            Scenario::BrokenListener => base.listener(ListenerRef::new("missingListener")),
        }
    }

    /// Builds the runner for this scenario and registers its execution.
    pub fn prepare(
        self,
        step_delay: Duration,
        repository: Arc<dyn JobRepository>,
    ) -> Result<JobExecutionRunner> {
        let job = Arc::new(self.job());
        let parameters: JobParameters = [("scenario", self.name())].into_iter().collect();
        let execution = Arc::new(JobExecution::new(job.clone(), parameters));
        repository.add_job_execution(&execution)?;

        let ctx = JobContext::new(job, execution, repository, Arc::new(registry()));
        Ok(JobExecutionRunner::new(ctx, traversal(step_delay)))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn traversal(step_delay: Duration) -> SequentialTraversal {
    let work = move |name: &'static str| {
        move |ctx: &JobContext| -> anyhow::Result<()> {
            std::thread::sleep(step_delay);
            info!(job = %ctx.job().id, step = name, "step done");
            Ok(())
        }
    };

    SequentialTraversal::new()
        .step("extract", work("extract"))
        .step("transform", work("transform"))
        .step("load", work("load"))
        .step("transform-unstable", move |_: &JobContext| {
            std::thread::sleep(step_delay);
            bail!("upstream returned 503")
        })
}

struct LoggingListener;

impl JobListener for LoggingListener {
    fn before_job(&mut self, ctx: &JobContext) -> anyhow::Result<()> {
        info!(job = %ctx.job().id, execution = %ctx.execution().id(), "before job");
        Ok(())
    }

    fn after_job(&mut self, ctx: &JobContext) -> anyhow::Result<()> {
        info!(
            job = %ctx.job().id,
            status = %ctx.execution().batch_status(),
            "after job"
        );
        Ok(())
    }
}

/// Sets the exit status to the batch status seen by the after-hook.
struct ExitStatusListener;

impl JobListener for ExitStatusListener {
    fn after_job(&mut self, ctx: &JobContext) -> anyhow::Result<()> {
        ctx.set_exit_status(ctx.execution().batch_status().to_string());
        Ok(())
    }
}

struct FailingListener {
    phase: String,
}

impl JobListener for FailingListener {
    fn before_job(&mut self, _ctx: &JobContext) -> anyhow::Result<()> {
        if self.phase == "before" {
            bail!("failing listener refused to start the job");
        }
        Ok(())
    }

    fn after_job(&mut self, _ctx: &JobContext) -> anyhow::Result<()> {
        if self.phase == "after" {
            bail!("failing listener could not wrap up the job");
        }
        Ok(())
    }
}

/// Listener artifacts available to the demo jobs.
pub fn registry() -> ArtifactRegistry {
    let mut registry = ArtifactRegistry::new();
    registry
        .register("loggingListener", |_: &Properties| {
            Ok(Box::new(LoggingListener) as Box<dyn JobListener>)
        })
        .register("exitStatusListener", |_: &Properties| {
            Ok(Box::new(ExitStatusListener) as Box<dyn JobListener>)
        })
        .register("failingListener", |props: &Properties| {
            let phase = props.get("phase").cloned().unwrap_or_else(|| "before".into());
            Ok(Box::new(FailingListener { phase }) as Box<dyn JobListener>)
        });
    registry
}
