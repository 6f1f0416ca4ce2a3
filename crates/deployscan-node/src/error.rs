//! Node-level error types.

use thiserror::Error;

use deployscan_core::error::IndexerError;

/// Errors returned by a [`NodeClient`](crate::NodeClient) operation.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node could not be reached or the CLI exited unsuccessfully.
    #[error("node unavailable: {0}")]
    Unavailable(String),

    /// The CLI ran but its output could not be read in any known format.
    #[error("malformed output from `{command}`: {reason}")]
    Malformed { command: String, reason: String },

    /// The node answered that the requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The CLI did not finish within the configured timeout.
    #[error("`{command}` timed out after {ms}ms")]
    Timeout { command: String, ms: u64 },

    /// The CLI program itself cannot be executed.
    #[error("cannot execute node program `{program}`: {reason}")]
    Spawn { program: String, reason: String },
}

impl NodeError {
    pub fn malformed(command: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }

    /// Short label used for the outcome dimension of the command counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Malformed { .. } => "malformed",
            Self::NotFound(_) => "not_found",
            Self::Timeout { .. } => "timeout",
            Self::Spawn { .. } => "spawn_failed",
        }
    }
}

impl From<NodeError> for IndexerError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Unavailable(msg) => IndexerError::TransientIo(msg),
            NodeError::Timeout { command, ms } => IndexerError::Timeout { operation: command, ms },
            NodeError::Malformed { command, reason } => {
                IndexerError::malformed(None, format!("{command}: {reason}"))
            }
            NodeError::NotFound(what) => IndexerError::malformed(None, format!("not found: {what}")),
            NodeError::Spawn { program, reason } => {
                IndexerError::Configuration(format!("cannot execute `{program}`: {reason}"))
            }
        }
    }
}
