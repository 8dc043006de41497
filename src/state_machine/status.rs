use std::fmt;

use serde::{Deserialize, Serialize};

/// Batch status of a job execution.
///
/// A run flows: STARTING → STARTED → (COMPLETED | FAILED | STOPPING → STOPPED).
/// `Stopping` can also be the first status the runner observes when a stop
/// was requested before the run began.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Created but not yet picked up by a runner.
    #[default]
    Starting,
    Started,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl BatchStatus {
    /// Whether no further transition is expected within the current run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Stopped | BatchStatus::Completed | BatchStatus::Failed
        )
    }

    /// Whether a stop request should move this status to `Stopping`.
    pub fn is_stoppable(self) -> bool {
        matches!(self, BatchStatus::Starting | BatchStatus::Started)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Starting => write!(f, "STARTING"),
            BatchStatus::Started => write!(f, "STARTED"),
            BatchStatus::Stopping => write!(f, "STOPPING"),
            BatchStatus::Stopped => write!(f, "STOPPED"),
            BatchStatus::Completed => write!(f, "COMPLETED"),
            BatchStatus::Failed => write!(f, "FAILED"),
        }
    }
}
