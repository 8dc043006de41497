mod execution;
mod job;
mod status;

pub use execution::{
    DEFINITION_NAME_PARAM, ExecutionSummary, JobExecution, JobParameters, RestartPosition,
};
pub use job::{Job, JobElement, ListenerRef, Properties};
pub use status::BatchStatus;
