//! Runner configuration loaded from `batchrun.toml`.
//!
//! Values missing from the file fall back to defaults. The `BATCHRUN_LOG`
//! environment variable takes precedence over the file's log filter.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BatchError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "batchrun.toml";
pub const LOG_ENV_VAR: &str = "BATCHRUN_LOG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Permits available to the task executor.
    #[serde(default = "default_max_permits")]
    pub max_permits: usize,

    /// `tracing` env-filter directive.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,

    /// Directory for the JSON file repository. In-memory when unset.
    #[serde(default)]
    pub repository_dir: Option<PathBuf>,

    /// Simulated work per demo step, in milliseconds.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

// Default permits: 8, room for four concurrent job runs.
fn default_max_permits() -> usize {
    8
}

// Default log filter: "info".
fn default_log_filter() -> String {
    "info".to_string()
}

// Default simulated step duration: 200ms.
fn default_step_delay_ms() -> u64 {
    200
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_permits: default_max_permits(),
            log_filter: default_log_filter(),
            json_logs: false,
            repository_dir: None,
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

impl RunnerConfig {
    /// Loads `path`, or `batchrun.toml` in the current directory when no path
    /// is given. A missing default file yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(filter) = std::env::var(LOG_ENV_VAR) {
            if !filter.is_empty() {
                config.log_filter = filter;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str::<RunnerConfig>(contents)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_permits == 0 {
            return Err(BatchError::Config("max_permits must be at least 1".into()));
        }
        Ok(())
    }
}
