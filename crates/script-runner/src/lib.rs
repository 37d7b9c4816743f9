//! # Script Runner
//!
//! Subprocess execution engine for post-deployment scripts.
//!
//! Runs one external script at a time with line-oriented output streaming,
//! hard wall-clock timeout enforcement, and forced termination on expiry.
//! Script batches execute in strict lexicographic order and the first
//! failure aborts the remainder.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod command;
mod error;
mod runner;

pub use command::Command;
pub use error::{Error, Result};
pub use runner::{
    DEFAULT_SCRIPT_TIMEOUT, ProcessResult, ScriptJob, ScriptRunner, discover_scripts,
};
