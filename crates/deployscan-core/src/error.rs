//! Error types for the deployscan pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while syncing.
///
/// The variants follow the handling policy of the sync loop: transient errors
/// are retried, malformed items are skipped, invariant violations abort the
/// cycle and keep the last good cursor, configuration errors stop startup.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("timed out after {ms}ms: {operation}")]
    Timeout { operation: String, ms: u64 },

    #[error("malformed data{}: {reason}", .height.map(|h| format!(" at block {h}")).unwrap_or_default())]
    DataMalformed { height: Option<u64>, reason: String },

    #[error("Reorg detected at block {block_number}: expected parent {expected}, got {actual}")]
    Reorg {
        block_number: u64,
        expected: String,
        actual: String,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },
}

/// Coarse error classes used for metric labels and the health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    TransientIo,
    DataMalformed,
    InvariantViolation,
    Configuration,
    Storage,
    Shutdown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientIo => "transient_io",
            Self::DataMalformed => "data_malformed",
            Self::InvariantViolation => "invariant_violation",
            Self::Configuration => "configuration",
            Self::Storage => "storage",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IndexerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TransientIo(_) | Self::Timeout { .. } => ErrorCategory::TransientIo,
            Self::DataMalformed { .. } => ErrorCategory::DataMalformed,
            Self::Reorg { .. } | Self::InvariantViolation(_) => ErrorCategory::InvariantViolation,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Aborted { .. } => ErrorCategory::Shutdown,
        }
    }

    /// Returns `true` if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo(_) | Self::Timeout { .. })
    }

    /// Returns `true` if the error is a reorg (operator action required).
    pub fn is_reorg(&self) -> bool {
        matches!(self, Self::Reorg { .. })
    }

    pub fn malformed(height: Option<u64>, reason: impl Into<String>) -> Self {
        Self::DataMalformed {
            height,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_handling_policy() {
        let reorg = IndexerError::Reorg {
            block_number: 7,
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(reorg.category(), ErrorCategory::InvariantViolation);
        assert!(reorg.is_reorg());
        assert!(!reorg.is_retryable());

        let timeout = IndexerError::Timeout {
            operation: "bonds".into(),
            ms: 100,
        };
        assert_eq!(timeout.category(), ErrorCategory::TransientIo);
        assert!(timeout.is_retryable());
    }

    #[test]
    fn malformed_message_includes_height() {
        let err = IndexerError::malformed(Some(12), "missing blockHash");
        assert_eq!(err.to_string(), "malformed data at block 12: missing blockHash");
        let err = IndexerError::malformed(None, "bad json");
        assert_eq!(err.to_string(), "malformed data: bad json");
    }
}
