//! Sync state and the pure phase functions of the state machine.
//!
//! The engine owns one [`SyncState`] and threads it through each phase; the
//! functions here never touch the node or the store, which keeps planning and
//! extraction testable without either.

use std::time::Duration;

use deployscan_core::cursor::SyncCursor;
use deployscan_core::identity::KeyDirectory;
use deployscan_core::raw::RawBlock;
use deployscan_extract::{Extracted, Extractor};

/// Everything the sync loop carries from one cycle to the next.
#[derive(Debug, Clone)]
pub struct SyncState {
    /// Last durably committed height, as last read from the store.
    pub cursor: SyncCursor,
    /// Last finalized tip reported by the node.
    pub tip: Option<u64>,
    /// Full validator keys seen so far.
    pub keys: KeyDirectory,
    /// Failed cycles since the last success.
    pub consecutive_failures: u32,
}

impl SyncState {
    pub fn new(min_key_fragment: usize) -> Self {
        Self {
            cursor: SyncCursor::unset(),
            tip: None,
            keys: KeyDirectory::new(min_key_fragment),
            consecutive_failures: 0,
        }
    }

    /// Blocks between the cursor and the tip.
    pub fn blocks_behind(&self) -> Option<u64> {
        deployscan_core::health::blocks_behind(self.tip, self.cursor.height())
    }

    /// Record a failed cycle and return how long to wait before the next one.
    ///
    /// The delay starts at `base` and doubles per consecutive failure, capped
    /// at `max`.
    pub fn record_failure(&mut self, base: Duration, max: Duration) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        error_backoff(self.consecutive_failures, base, max)
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// `base * 2^(failures - 1)`, capped at `max`.
pub fn error_backoff(failures: u32, base: Duration, max: Duration) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(max)
}

/// An inclusive range of heights to fetch and commit in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub start: u64,
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl BatchPlan {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Plan the next batch: `cursor + 1 ..= min(cursor + batch_size, tip, stop_at)`.
///
/// Returns `None` when there is nothing to do (tip unknown, cursor caught up,
/// or `stop_at` reached). Genesis is never planned here; it is handled by the
/// bootstrap phase before the first batch.
pub fn plan_batch(state: &SyncState, batch_size: u64, stop_at: Option<u64>) -> Option<BatchPlan> {
    let tip = state.tip?;
    let start = state.cursor.height()? + 1;
    let limit = stop_at.map_or(tip, |stop| stop.min(tip));
    if start > limit || batch_size == 0 {
        return None;
    }
    let end = start.saturating_add(batch_size - 1).min(limit);
    Some(BatchPlan { start, end })
}

/// Teach `keys` every full validator key visible in `block`.
pub fn learn_keys(keys: &mut KeyDirectory, block: &RawBlock) {
    keys.learn(&block.proposer);
    for bond in &block.bonds {
        keys.learn(&bond.validator);
    }
    for j in &block.justifications {
        keys.learn(&j.validator);
    }
}

/// Extract every block of a fetched batch, in height order.
///
/// Keys are learned from each block before it is extracted so that an
/// abbreviated key resolves as soon as its full form has appeared anywhere
/// in the chain so far.
pub fn extract_batch(extractor: &Extractor, blocks: &[RawBlock], keys: &mut KeyDirectory) -> Vec<Extracted> {
    blocks
        .iter()
        .map(|block| {
            learn_keys(keys, block);
            let extracted = extractor.extract_block(block, keys);
            let skipped = extracted.skipped.len() as u64 + u64::from(block.skipped_deploys);
            if skipped > 0 {
                deployscan_core::metrics::record_deploys_skipped(skipped);
            }
            extracted
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployscan_core::config::AddressRules;

    fn state(cursor: Option<u64>, tip: Option<u64>) -> SyncState {
        let mut s = SyncState::new(6);
        s.cursor.reset_to(cursor);
        s.tip = tip;
        s
    }

    #[test]
    fn plan_first_batch_after_genesis() {
        let plan = plan_batch(&state(Some(0), Some(10)), 5, None).unwrap();
        assert_eq!(plan, BatchPlan { start: 1, end: 5 });
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn plan_clamped_to_tip() {
        let plan = plan_batch(&state(Some(5), Some(7)), 5, None).unwrap();
        assert_eq!(plan, BatchPlan { start: 6, end: 7 });
    }

    #[test]
    fn plan_clamped_to_stop_at() {
        let plan = plan_batch(&state(Some(5), Some(100)), 50, Some(8)).unwrap();
        assert_eq!(plan, BatchPlan { start: 6, end: 8 });
        assert!(plan_batch(&state(Some(8), Some(100)), 50, Some(8)).is_none());
    }

    #[test]
    fn nothing_to_do() {
        assert!(plan_batch(&state(Some(10), Some(10)), 5, None).is_none());
        assert!(plan_batch(&state(Some(12), Some(10)), 5, None).is_none(), "tip went backwards");
        assert!(plan_batch(&state(Some(3), None), 5, None).is_none());
        assert!(plan_batch(&state(None, Some(10)), 5, None).is_none(), "genesis first");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(500);
        assert_eq!(error_backoff(1, base, max), Duration::from_millis(100));
        assert_eq!(error_backoff(2, base, max), Duration::from_millis(200));
        assert_eq!(error_backoff(3, base, max), Duration::from_millis(400));
        assert_eq!(error_backoff(4, base, max), max);
        assert_eq!(error_backoff(60, base, max), max);
    }

    #[test]
    fn failures_reset_on_success() {
        let mut s = state(Some(1), Some(2));
        let base = Duration::from_millis(10);
        let max = Duration::from_secs(1);
        s.record_failure(base, max);
        assert_eq!(s.record_failure(base, max), Duration::from_millis(20));
        s.record_success();
        assert_eq!(s.record_failure(base, max), base);
    }

    #[test]
    fn batch_extraction_learns_keys_in_order() {
        use deployscan_core::raw::{RawBlock, RawBond};

        let full = format!("04{}", "ab".repeat(64));
        let abbreviated = format!("{}...{}", &full[..10], &full[full.len() - 6..]);
        let block = |height: u64, proposer: &str, bonds: Vec<RawBond>| RawBlock {
            height,
            hash: format!("h{height}"),
            parent_hash: format!("h{}", height - 1),
            timestamp: 0,
            proposer: proposer.to_string(),
            pre_state_hash: String::new(),
            post_state_hash: String::new(),
            finalized: true,
            fault_tolerance: 0.0,
            bonds,
            justifications: vec![],
            deploys: vec![],
            allocations: vec![],
            skipped_deploys: 0,
        };
        let blocks = vec![
            block(1, &full, vec![]),
            block(2, &abbreviated, vec![RawBond { validator: abbreviated.clone(), stake: 5 }]),
        ];
        let extractor = Extractor::new(AddressRules::default()).unwrap();
        let mut keys = KeyDirectory::new(6);
        let out = extract_batch(&extractor, &blocks, &mut keys);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].commit.block.proposer, full);
        assert_eq!(out[1].commit.bonds[0].validator, full);
        assert_eq!(keys.len(), 1);
    }
}
