//! Error types for control-plane calls

use thiserror::Error;

/// Unified error type for control-plane calls
#[derive(Error, Debug)]
pub enum Error {
    /// The endpoint answered with a non-success status
    #[error("{method} {url} returned {status}")]
    UnexpectedStatus {
        /// HTTP method of the failed request
        method: String,
        /// Target URL of the failed request
        url: String,
        /// The non-success status code
        status: reqwest::StatusCode,
    },

    /// DNS, connect, or protocol-level failure
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The token signing collaborator failed
    #[error("failed to sign request token: {0}")]
    Token(String),

    /// A request URL could not be parsed
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
