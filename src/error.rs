//! Error types for builds-e2e
//!
//! Poll failures keep the namespace, name, reason and message of the resource
//! that failed so an assertion message is actionable without re-querying the
//! cluster.

use std::time::Duration;

use thiserror::Error;

/// Main error type for builds-e2e operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Manifest file could not be read, parsed, applied or deleted
    #[error("manifest error [{path}]: {message}")]
    Manifest {
        /// Path of the manifest file
        path: String,
        /// Description of what failed
        message: String,
    },

    /// Invalid configuration (environment, CLI arguments, poll spec)
    #[error("configuration error: {0}")]
    Config(String),

    /// The watched resource reached a terminal failure state
    #[error("{namespace}/{name} failed with reason: {reason}, message: {message}")]
    ConditionFailed {
        /// Namespace of the watched resource
        namespace: String,
        /// Name of the watched resource
        name: String,
        /// Machine-readable failure reason
        reason: String,
        /// Human-readable failure detail
        message: String,
    },

    /// The condition was not met before the deadline
    #[error("timed out after {timeout:?} waiting for {namespace}/{name}: {last_snapshot}")]
    Timeout {
        /// Namespace of the watched resource
        namespace: String,
        /// Name of the watched resource
        name: String,
        /// Configured poll timeout
        timeout: Duration,
        /// Rendered last observed state, or a note that none was observed
        last_snapshot: String,
    },

    /// Polling was cancelled before an outcome was reached
    #[error("polling {namespace}/{name} was cancelled")]
    Cancelled {
        /// Namespace of the watched resource
        namespace: String,
        /// Name of the watched resource
        name: String,
    },

    /// A scenario body panicked or its cleanup failed
    #[error("scenario [{scenario}]: {message}")]
    Scenario {
        /// Scenario name
        scenario: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a manifest error for the given file
    pub fn manifest(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a scenario error with the given message
    pub fn scenario(scenario: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Scenario {
            scenario: scenario.into(),
            message: msg.into(),
        }
    }

    /// Whether this error came out of a poll assertion rather than setup
    pub fn is_poll_outcome(&self) -> bool {
        matches!(
            self,
            Self::ConditionFailed { .. } | Self::Timeout { .. } | Self::Cancelled { .. }
        )
    }
}
