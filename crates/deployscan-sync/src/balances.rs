//! Balance snapshots for ordinary blocks.
//!
//! Extraction is pure and cannot see earlier balances, so snapshots are
//! derived right before a block is committed: start from the latest stored
//! snapshot strictly below the block, apply the block's applied transfers and
//! bond changes, and emit one row per touched address. A validator missing
//! from the block's bonds map that was bonded in the previous bonds map is
//! snapshotted with a zero bonded balance. Because the baseline
//! is always "strictly before this height", replaying a block yields the same
//! rows.

use std::collections::BTreeMap;

use deployscan_core::error::IndexerError;
use deployscan_core::types::{BalanceState, BlockCommit, TransferStatus};
use deployscan_extract::AddressValidator;
use deployscan_storage::IndexStore;

#[derive(Debug, Default)]
struct Change {
    unbonded_delta: i64,
    bonded: Option<i64>,
}

/// Fill `commit.balances` for a non-genesis block.
///
/// Genesis commits carry their own snapshots and are left untouched.
pub async fn derive_balances(
    store: &dyn IndexStore,
    addresses: &AddressValidator,
    commit: &mut BlockCommit,
) -> Result<(), IndexerError> {
    let height = commit.height();
    if height == 0 {
        return Ok(());
    }

    let mut changes: BTreeMap<String, Change> = BTreeMap::new();
    for t in commit.transfers.iter().filter(|t| t.status == TransferStatus::Success) {
        if addresses.is_token_address(&t.from_address) {
            changes.entry(t.from_address.clone()).or_default().unbonded_delta -= t.amount_dust();
        }
        if addresses.is_token_address(&t.to_address) {
            changes.entry(t.to_address.clone()).or_default().unbonded_delta += t.amount_dust();
        }
    }

    for bond in &commit.bonds {
        let previous = store.balance_before(&bond.validator, height).await?;
        if previous.as_ref().map(|b| b.bonded_dust) != Some(bond.stake) {
            changes.entry(bond.validator.clone()).or_default().bonded = Some(bond.stake);
        }
    }
    // A block without a bonds map says nothing about who left.
    if !commit.bonds.is_empty() {
        for left in store.bonds_before(height).await? {
            if commit.bonds.iter().any(|b| b.validator == left.validator) {
                continue;
            }
            let previous = store.balance_before(&left.validator, height).await?;
            if previous.is_some_and(|b| b.bonded_dust != 0) {
                changes.entry(left.validator).or_default().bonded = Some(0);
            }
        }
    }

    let mut rows = Vec::new();
    for (address, change) in changes {
        let previous = store.balance_before(&address, height).await?;
        let (bonded, unbonded) = previous
            .map(|b| (b.bonded_dust, b.unbonded_dust))
            .unwrap_or((0, 0));
        let unbonded_dust = unbonded.saturating_add(change.unbonded_delta);
        if unbonded_dust < 0 {
            tracing::debug!(
                block_height = height,
                address = %address,
                unbonded_dust,
                "balance below zero; an earlier credit was not indexed"
            );
        }
        rows.push(BalanceState {
            address,
            block_height: height,
            bonded_dust: change.bonded.unwrap_or(bonded),
            unbonded_dust,
        });
    }
    commit.balances = rows;
    Ok(())
}
