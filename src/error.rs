use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::anyhow;
use thiserror::Error;

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, BatchError>;

#[derive(Debug, Error)]
pub enum BatchError {
    /// Listener construction or a before-hook failed; traversal never started.
    #[error("setup failed in {component}: {source}")]
    Setup {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    /// The traversal engine failed while running job elements.
    #[error("execution failed: {source}")]
    Execution {
        #[source]
        source: anyhow::Error,
    },

    /// An after-hook failed.
    #[error("teardown failed in {component}: {source}")]
    Teardown {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("No artifact registered under reference: {0}")]
    UnknownArtifact(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Task requires {required} permits but the executor only has {capacity}")]
    Capacity { required: usize, capacity: usize },

    #[error("Task executor has been closed")]
    ExecutorClosed,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BatchError {
    /// Name of the job component that failed, when one is known.
    pub fn component(&self) -> Option<&str> {
        match self {
            BatchError::Setup { component, .. } | BatchError::Teardown { component, .. } => {
                Some(component)
            }
            BatchError::UnknownArtifact(reference) => Some(reference),
            _ => None,
        }
    }
}

/// Runs `f`, turning a panic into an error.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> T) -> anyhow::Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| anyhow!("panicked: {}", panic_message(&*payload)))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
