//! Recorder configuration.
//!
//! Hosts usually build this with [`RecorderConfig::for_script`] and then
//! apply [`with_env`](RecorderConfig::with_env). It also deserializes from
//! TOML so a host can embed a `[rewind]` table in its own config file.

use crate::error::RecorderError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the base directory filter.
pub const ENV_BASE_DIR: &str = "REWIND_BASEDIR";
/// Environment variable overriding the log path.
pub const ENV_LOG_PATH: &str = "REWIND_LOG";
/// Extension of trace logs.
pub const LOG_EXTENSION: &str = "rewind";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Where the trace log is written.
    pub log_path: PathBuf,
    /// Only frames whose source lies under this directory are traced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

impl RecorderConfig {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        RecorderConfig {
            log_path: log_path.into(),
            base_dir: None,
        }
    }

    /// Log next to the traced script: `dir/game.py` logs to `dir/game.rewind`.
    pub fn for_script(script: impl AsRef<Path>) -> Self {
        Self::new(script.as_ref().with_extension(LOG_EXTENSION))
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Apply `REWIND_BASEDIR` and `REWIND_LOG` from the process environment.
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var_os(key).map(PathBuf::from))
    }

    /// Apply overrides from an arbitrary variable source. Empty values are
    /// ignored.
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|p| !p.as_os_str().is_empty());
        if let Some(base_dir) = lookup(ENV_BASE_DIR) {
            self.base_dir = Some(base_dir);
        }
        if let Some(log_path) = lookup(ENV_LOG_PATH) {
            self.log_path = log_path;
        }
        self
    }

    /// Parse a TOML document with `log_path` and optional `base_dir` keys.
    pub fn from_toml_str(s: &str) -> Result<Self, RecorderError> {
        let config: Self = toml::from_str(s).map_err(|e| RecorderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.log_path.as_os_str().is_empty() {
            return Err(RecorderError::Config("log_path must not be empty".into()));
        }
        Ok(())
    }
}
