//! Errors surfaced to the host.
//!
//! Only session start-up and configuration loading can fail from the host's
//! point of view. Hooks never return errors: a failure while tracing ends the
//! session and is reported in its [`SessionSummary`](crate::SessionSummary).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("cannot open trace log '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid recorder configuration: {0}")]
    Config(String),
}
