use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::Job;
use super::status::BatchStatus;

/// Parameter key under which a failed or stopped execution remembers the
/// definition-file name of its job.
pub const DEFINITION_NAME_PARAM: &str = "batchrun.definitionName";

/// Where a restarted execution resumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "element", rename_all = "snake_case")]
pub enum RestartPosition {
    /// From the first job element.
    #[default]
    Head,
    /// From the job element with this id.
    At(String),
    /// The execution must not be restarted.
    Unrestartable,
}

impl fmt::Display for RestartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPosition::Head => write!(f, "<head>"),
            RestartPosition::At(element) => write!(f, "{element}"),
            RestartPosition::Unrestartable => write!(f, "<unrestartable>"),
        }
    }
}

/// Job parameters in insertion order. Setting an existing key replaces its
/// value in place, so repeated sets never produce duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters(Vec<(String, String)>);

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` when the parameter set actually changed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) if *existing == value => false,
            Some((_, existing)) => {
                *existing = value;
                true
            }
            None => {
                self.0.push((key, value));
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for JobParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = JobParameters::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

#[derive(Debug)]
struct ExecutionState {
    batch_status: BatchStatus,
    // Set by `request_stop`, never cleared.
    stop_requested: bool,
    // Free-form outcome, usually set by a listener.
    exit_status: Option<String>,
    // Where a restart of this execution resumes.
    restart_position: RestartPosition,
    parameters: JobParameters,
    // First transition to STARTED.
    started_at: Option<DateTime<Utc>>,
    // Latest transition to a terminal status.
    ended_at: Option<DateTime<Utc>>,
    last_updated: DateTime<Utc>,
    // Cached definition, released by `clean_up`.
    job: Option<Arc<Job>>,
    cleaned_up: bool,
}

/// Runtime record of one job execution.
///
/// Shared between the thread running the job and whoever may request a stop.
/// All fields sit behind one lock, so status and stop flag are always read as
/// a consistent pair; the lock is only held for the duration of an accessor.
#[derive(Debug)]
pub struct JobExecution {
    id: Uuid,
    job_name: String,
    created_at: DateTime<Utc>,
    state: Mutex<ExecutionState>,
}

impl JobExecution {
    pub fn new(job: Arc<Job>, parameters: JobParameters) -> Self {
        Self::restart_of(job, parameters, RestartPosition::Head)
    }

    /// A new execution resuming from `restart_position`.
    pub fn restart_of(
        job: Arc<Job>,
        parameters: JobParameters,
        restart_position: RestartPosition,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_name: job.id.clone(),
            created_at: now,
            state: Mutex::new(ExecutionState {
                batch_status: BatchStatus::Starting,
                stop_requested: false,
                exit_status: None,
                restart_position,
                parameters,
                started_at: None,
                ended_at: None,
                last_updated: now,
                job: Some(job),
                cleaned_up: false,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn batch_status(&self) -> BatchStatus {
        self.state.lock().batch_status
    }

    pub fn set_batch_status(&self, status: BatchStatus) {
        let mut state = self.state.lock();
        let now = Utc::now();
        if status == BatchStatus::Started && state.started_at.is_none() {
            state.started_at = Some(now);
        }
        if status.is_terminal() {
            state.ended_at = Some(now);
        }
        state.batch_status = status;
        state.last_updated = now;
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.lock().stop_requested
    }

    /// Asks the run to stop. A starting or running execution moves to
    /// `Stopping`; the runner and traversal engine observe the flag at their
    /// own checkpoints. Returns the status after the request.
    pub fn request_stop(&self) -> BatchStatus {
        let mut state = self.state.lock();
        state.stop_requested = true;
        if state.batch_status.is_stoppable() {
            state.batch_status = BatchStatus::Stopping;
            state.last_updated = Utc::now();
        }
        state.batch_status
    }

    /// Status and stop flag read under the same lock.
    pub fn status_snapshot(&self) -> (BatchStatus, bool) {
        let state = self.state.lock();
        (state.batch_status, state.stop_requested)
    }

    pub fn exit_status(&self) -> Option<String> {
        self.state.lock().exit_status.clone()
    }

    pub fn set_exit_status(&self, exit_status: impl Into<String>) {
        let mut state = self.state.lock();
        state.exit_status = Some(exit_status.into());
        state.last_updated = Utc::now();
    }

    pub fn restart_position(&self) -> RestartPosition {
        self.state.lock().restart_position.clone()
    }

    pub fn set_restart_position(&self, position: RestartPosition) {
        self.state.lock().restart_position = position;
    }

    pub fn parameters(&self) -> JobParameters {
        self.state.lock().parameters.clone()
    }

    /// Returns `true` when the parameter set changed.
    pub fn set_parameter(&self, key: impl Into<String>, value: impl Into<String>) -> bool {
        self.state.lock().parameters.set(key, value)
    }

    /// The cached job definition, gone once the execution has been cleaned up.
    pub fn job(&self) -> Option<Arc<Job>> {
        self.state.lock().job.clone()
    }

    /// Releases what the record holds on to for the duration of a run.
    pub fn clean_up(&self) {
        let mut state = self.state.lock();
        state.job = None;
        state.cleaned_up = true;
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.state.lock().cleaned_up
    }

    /// One-line description used when a run starts.
    pub fn dump(&self) -> String {
        let state = self.state.lock();
        format!(
            "JobExecution{{id={}, job={}, status={}, stopRequested={}, restartPosition={}, exitStatus={}, parameters={}}}",
            self.id,
            self.job_name,
            state.batch_status,
            state.stop_requested,
            state.restart_position,
            state.exit_status.as_deref().unwrap_or("-"),
            state.parameters.len(),
        )
    }

    pub fn summary(&self) -> ExecutionSummary {
        let state = self.state.lock();
        let duration_ms = state
            .started_at
            .zip(state.ended_at)
            .map(|(start, end)| (end - start).num_milliseconds());

        ExecutionSummary {
            execution_id: self.id,
            job_name: self.job_name.clone(),
            status: state.batch_status,
            exit_status: state.exit_status.clone(),
            restart_position: state.restart_position.clone(),
            parameters: state.parameters.clone(),
            created_at: self.created_at,
            started_at: state.started_at,
            ended_at: state.ended_at,
            last_updated: state.last_updated,
            duration_ms,
        }
    }
}

/// Serializable snapshot of a job execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: Uuid,
    pub job_name: String,
    pub status: BatchStatus,
    pub exit_status: Option<String>,
    pub restart_position: RestartPosition,
    pub parameters: JobParameters,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub duration_ms: Option<i64>,
}
