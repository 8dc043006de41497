//! Persistence of job execution records.
//!
//! [`JobRepository::update_job_execution`] always stores status and exit
//! status. Restart position and parameters are only written when the update
//! is final or the caller says parameters changed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{BatchError, Result};
use crate::state_machine::{BatchStatus, ExecutionSummary, JobExecution};

pub trait JobRepository: Send + Sync {
    /// Stores the initial record of a new execution.
    fn add_job_execution(&self, execution: &JobExecution) -> Result<()>;

    fn update_job_execution(
        &self,
        execution: &JobExecution,
        is_final: bool,
        parameters_changed: bool,
    ) -> Result<()>;

    fn find_job_execution(&self, id: Uuid) -> Result<Option<ExecutionSummary>>;
}

/// Applies an update to a stored record following the partial/full rules.
fn merge_update(
    stored: &mut ExecutionSummary,
    current: ExecutionSummary,
    is_final: bool,
    parameters_changed: bool,
) {
    stored.status = current.status;
    stored.exit_status = current.exit_status;
    stored.started_at = current.started_at;
    stored.ended_at = current.ended_at;
    stored.last_updated = current.last_updated;
    stored.duration_ms = current.duration_ms;
    if is_final || parameters_changed {
        stored.restart_position = current.restart_position;
        stored.parameters = current.parameters;
    }
}

/// One call to [`JobRepository::update_job_execution`], as seen by the in-memory repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpdate {
    pub execution_id: Uuid,
    pub status: BatchStatus,
    pub is_final: bool,
    pub parameters_changed: bool,
}

/// Repository keeping records in memory. Also keeps the sequence of updates.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    executions: Mutex<HashMap<Uuid, ExecutionSummary>>,
    updates: Mutex<Vec<RecordedUpdate>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.updates.lock().clone()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn add_job_execution(&self, execution: &JobExecution) -> Result<()> {
        self.executions.lock().insert(execution.id(), execution.summary());
        Ok(())
    }

    fn update_job_execution(
        &self,
        execution: &JobExecution,
        is_final: bool,
        parameters_changed: bool,
    ) -> Result<()> {
        let current = execution.summary();
        let status = current.status;
        {
            let mut executions = self.executions.lock();
            let stored = executions.get_mut(&execution.id()).ok_or_else(|| {
                BatchError::Repository(format!("unknown job execution {}", execution.id()))
            })?;
            merge_update(stored, current, is_final, parameters_changed);
        }
        self.updates.lock().push(RecordedUpdate {
            execution_id: execution.id(),
            status,
            is_final,
            parameters_changed,
        });
        Ok(())
    }

    fn find_job_execution(&self, id: Uuid) -> Result<Option<ExecutionSummary>> {
        Ok(self.executions.lock().get(&id).cloned())
    }
}

/// Repository writing one pretty-printed JSON file per execution.
#[derive(Debug)]
pub struct JsonFileJobRepository {
    dir: PathBuf,
    // Serializes read-modify-write cycles on the files.
    lock: Mutex<()>,
}

impl JsonFileJobRepository {
    /// Opens (and creates if needed) the repository directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read(&self, id: Uuid) -> Result<Option<ExecutionSummary>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write(&self, summary: &ExecutionSummary) -> Result<()> {
        let path = self.path_for(summary.execution_id);
        fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        debug!(path = %path.display(), status = %summary.status, "wrote job execution");
        Ok(())
    }
}

impl JobRepository for JsonFileJobRepository {
    fn add_job_execution(&self, execution: &JobExecution) -> Result<()> {
        let _guard = self.lock.lock();
        self.write(&execution.summary())
    }

    fn update_job_execution(
        &self,
        execution: &JobExecution,
        is_final: bool,
        parameters_changed: bool,
    ) -> Result<()> {
        let _guard = self.lock.lock();
        let mut stored = self.read(execution.id())?.ok_or_else(|| {
            BatchError::Repository(format!("unknown job execution {}", execution.id()))
        })?;
        merge_update(&mut stored, execution.summary(), is_final, parameters_changed);
        self.write(&stored)
    }

    fn find_job_execution(&self, id: Uuid) -> Result<Option<ExecutionSummary>> {
        let _guard = self.lock.lock();
        self.read(id)
    }
}
