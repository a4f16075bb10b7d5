//! Error types shared by every solver component.

use thiserror::Error;

use crate::gpi::config::ConfigError;

/// Errors raised by environments, value strategies, policies and solvers.
#[derive(Debug, Error)]
pub enum GpiError {
    /// A constructor or setter received an argument it cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Solver or planning configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A state or state-action pair is unknown to the environment or table.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A state that must offer actions has none.
    #[error("no available actions for state {0}")]
    NoActions(String),

    /// The environment does not implement the requested operation.
    #[error("{0} is not available in this environment")]
    Unimplemented(&'static str),

    /// Filesystem or socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted document is not valid JSON of the expected shape.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted key does not decode into the expected state or action.
    #[error("malformed key {key:?}: {reason}")]
    MalformedKey {
        /// The offending key.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// A networked environment received something it cannot interpret.
    #[error("connector error: {0}")]
    Connector(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GpiError>;
