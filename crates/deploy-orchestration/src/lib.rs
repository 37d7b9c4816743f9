//! # Deploy Orchestration
//!
//! Post-deployment orchestration helper: runs once per deployment or restart
//! event, executes operator-supplied scripts, notifies the control plane of
//! state changes (trigger registration, slot auto-swap, instance restart,
//! package-pointer updates), and tracks long-running operations through
//! best-effort liveness markers so the platform can detect stalls.
//!
//! The caller is responsible for ensuring only one orchestration runs at a
//! time; mutual exclusion is not enforced internally.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod config;
mod markers;
mod orchestrator;
mod triggers;

pub use config::DeploymentConfig;
pub use markers::{PendingOperationTracker, SwapLock};
pub use orchestrator::PostDeploymentRunner;
pub use triggers::{DurableTaskConfig, enrich_durable_triggers, list_triggers};

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A required environment identity is absent; nothing was attempted
    #[error("missing required environment value: {0}")]
    PreconditionMissing(&'static str),

    /// Script execution errors
    #[error("script execution error: {0}")]
    Script(#[from] script_runner::Error),

    /// Control-plane call errors
    #[error("control-plane error: {0}")]
    ControlPlane(#[from] control_plane::Error),

    /// A per-function metadata file failed to parse or is structurally invalid
    #[error("malformed trigger metadata in {path}: {reason}")]
    MalformedTrigger {
        /// Path of the offending metadata file
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
