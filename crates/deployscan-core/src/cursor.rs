//! Sync cursor: the last block height whose commit is durable.
//!
//! The cursor is the only coordination state that survives a crash. It is
//! read before planning a batch and advanced only after the corresponding
//! block's atomic write has been confirmed.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Key under which the cursor is stored in the key-value state table.
pub const CURSOR_KEY: &str = "last_indexed_block";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// `None` until genesis has been fully committed.
    height: Option<u64>,
}

impl SyncCursor {
    pub fn unset() -> Self {
        Self { height: None }
    }

    pub fn at(height: u64) -> Self {
        Self {
            height: Some(height),
        }
    }

    pub fn height(&self) -> Option<u64> {
        self.height
    }

    pub fn is_unset(&self) -> bool {
        self.height.is_none()
    }

    /// Returns the next block to process (cursor + 1, or genesis).
    pub fn next_height(&self) -> u64 {
        self.height.map_or(0, |h| h + 1)
    }

    /// Advance to `height`. Moving backwards is an invariant violation; use
    /// [`SyncCursor::reset_to`] for operator-initiated re-syncs.
    pub fn advance(&mut self, height: u64) -> Result<(), IndexerError> {
        if let Some(current) = self.height {
            if height < current {
                return Err(IndexerError::InvariantViolation(format!(
                    "cursor would move backwards from {current} to {height}"
                )));
            }
        }
        self.height = Some(height);
        Ok(())
    }

    pub fn reset_to(&mut self, height: Option<u64>) {
        self.height = height;
    }

    /// Encode for the key-value state table.
    pub fn encode(&self) -> Option<String> {
        self.height.map(|h| h.to_string())
    }

    pub fn decode(value: Option<&str>) -> Result<Self, IndexerError> {
        match value {
            None => Ok(Self::unset()),
            Some(v) => v
                .trim()
                .parse::<u64>()
                .map(Self::at)
                .map_err(|e| IndexerError::Storage(format!("corrupt cursor value {v:?}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advance() {
        let mut cursor = SyncCursor::unset();
        assert_eq!(cursor.next_height(), 0);
        cursor.advance(0).unwrap();
        assert_eq!(cursor.next_height(), 1);
        cursor.advance(5).unwrap();
        assert_eq!(cursor.height(), Some(5));
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let mut cursor = SyncCursor::at(10);
        assert!(cursor.advance(9).is_err());
        assert_eq!(cursor.height(), Some(10));
        cursor.reset_to(Some(4));
        assert_eq!(cursor.next_height(), 5);
    }

    #[test]
    fn cursor_encoding() {
        assert_eq!(SyncCursor::decode(None).unwrap(), SyncCursor::unset());
        assert_eq!(SyncCursor::decode(Some("42")).unwrap(), SyncCursor::at(42));
        assert!(SyncCursor::decode(Some("forty")).is_err());
        assert_eq!(SyncCursor::at(7).encode().as_deref(), Some("7"));
    }
}
