//! batchrun drives batch job executions through their lifecycle.
//!
//! A [`JobExecutionRunner`] takes one [`JobExecution`] from `STARTING` to a
//! terminal status: it builds the job's listeners, runs their hooks around the
//! job's [`Traversal`], resolves the final status, records restart information
//! and persists the result through a [`JobRepository`]. Runs are scheduled on a
//! [`TaskExecutor`], where a job run takes [`JOB_RUN_PERMITS`] permits.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod context;
pub mod demo;
pub mod error;
pub mod executor;
pub mod report;
pub mod repository;
pub mod runner;
pub mod state_machine;
pub mod traversal;
pub mod ui;

pub use artifact::{ArtifactFactory, ArtifactRegistry, JobListener, ListenerHandle};
pub use context::{JobContext, ScopedInstance};
pub use error::{BatchError, Result};
pub use executor::{JobTask, TaskExecutor};
pub use report::{FailureSink, TracingFailureSink};
pub use repository::{InMemoryJobRepository, JobRepository, JsonFileJobRepository};
pub use runner::{JOB_RUN_PERMITS, JobExecutionRunner};
pub use state_machine::{BatchStatus, Job, JobExecution, JobParameters, RestartPosition};
pub use traversal::{SequentialTraversal, Traversal};
