//! Error types for script execution

use std::time::Duration;
use thiserror::Error;

/// Unified error type for script execution
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn the script process
    #[error("failed to spawn script {script}: {reason}")]
    SpawnFailed {
        /// File name of the script that failed to spawn
        script: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// Script exceeded its wall-clock budget and was killed
    #[error("script {script} (pid {pid:?}) timed out after {timeout:?}")]
    Timeout {
        /// File name of the script
        script: String,
        /// Process id, when one was assigned
        pid: Option<u32>,
        /// The configured timeout that was exceeded
        timeout: Duration,
    },

    /// Script completed but signaled failure via its exit code
    #[error("script {script} (pid {pid:?}) exited with code {code}")]
    NonZeroExit {
        /// File name of the script
        script: String,
        /// Process id, when one was assigned
        pid: Option<u32>,
        /// The non-zero exit code
        code: i32,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(script: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            script: script.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
