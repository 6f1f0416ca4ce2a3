//! Reorg detection.
//!
//! The indexer only reads finalized data, so a broken parent-hash link is
//! treated as a signal for the operator, not something to repair: the cycle
//! aborts and the cursor stays where it was.

use crate::error::IndexerError;
use crate::raw::RawBlock;

/// Verify that `blocks` (ascending, contiguous) chain onto `anchor`, the
/// stored `(height, hash)` of the block just below the batch.
///
/// `anchor` is `None` when nothing is stored below the batch (first batch
/// after genesis was reset, or an operator re-sync); only the in-batch links
/// are checked then.
pub fn verify_linkage(anchor: Option<(u64, &str)>, blocks: &[RawBlock]) -> Result<(), IndexerError> {
    let mut prev: Option<(u64, &str)> = anchor;
    for block in blocks {
        if let Some((prev_height, prev_hash)) = prev {
            if block.height != prev_height + 1 {
                return Err(IndexerError::InvariantViolation(format!(
                    "non-contiguous batch: block {} follows {}",
                    block.height, prev_height
                )));
            }
            if block.parent_hash != prev_hash {
                tracing::error!(
                    height = block.height,
                    expected = prev_hash,
                    actual = %block.parent_hash,
                    "Reorg detected: parent hash does not match stored block"
                );
                return Err(IndexerError::Reorg {
                    block_number: block.height,
                    expected: prev_hash.to_string(),
                    actual: block.parent_hash.clone(),
                });
            }
        }
        prev = Some((block.height, block.hash.as_str()));
    }
    Ok(())
}

/// Watches the node's reported finalized tip for regressions.
///
/// A tip lower than one previously seen means the node switched to a
/// different view of the chain (or was replaced); it is logged and reported,
/// the sync loop simply waits for the tip to catch up again.
#[derive(Debug, Default)]
pub struct TipMonitor {
    last_tip: Option<u64>,
}

impl TipMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new tip. Returns the regression depth if the tip decreased.
    pub fn observe(&mut self, tip: u64) -> Option<u64> {
        let regression = match self.last_tip {
            Some(last) if tip < last => {
                tracing::warn!(last_tip = last, new_tip = tip, "Finalized tip decreased; possible node inconsistency");
                Some(last - tip)
            }
            _ => None,
        };
        self.last_tip = Some(tip);
        regression
    }
}
