//! Two-phase block fetch.
//!
//! Phase one asks for the light summaries of a height range; phase two pulls
//! full detail for each summary hash with at most `concurrency` requests in
//! flight. Results come back in height order regardless of completion order.
//! Any single failure aborts the whole batch.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt, TryStreamExt};

use deployscan_core::error::IndexerError;
use deployscan_core::raw::{BlockSummary, RawBlock};
use deployscan_node::{NodeClient, NodeError};

/// Fetch full detail for every block in `start..=end`.
///
/// Every returned block is marked finalized: callers only ask for heights at
/// or below the last finalized tip.
pub async fn fetch_blocks(
    client: &dyn NodeClient,
    start: u64,
    end: u64,
    concurrency: usize,
) -> Result<Vec<RawBlock>, IndexerError> {
    let summaries = fetch_summaries(client, start, end).await?;

    let blocks: Vec<RawBlock> = stream::iter(summaries.into_iter().map(|summary| async move {
        match client.block(&summary.hash).await {
            Ok(block) => check_detail(&summary, block),
            Err(e) => Err(at_height(e, summary.height)),
        }
    }))
    .buffered(concurrency.max(1))
    .try_collect()
    .await?;

    let skipped: u32 = blocks.iter().map(|b| b.skipped_deploys).sum();
    tracing::debug!(start, end, blocks = blocks.len(), unreadable_deploys = skipped, "batch fetched");
    Ok(blocks)
}

/// Summaries for `start..=end`, exactly one per height, ascending.
pub async fn fetch_summaries(client: &dyn NodeClient, start: u64, end: u64) -> Result<Vec<BlockSummary>, IndexerError> {
    let reported = client.blocks_by_height(start, end).await?;
    let mut by_height: BTreeMap<u64, BlockSummary> = BTreeMap::new();
    for summary in reported {
        if summary.height < start || summary.height > end {
            tracing::debug!(height = summary.height, start, end, "ignoring summary outside requested range");
            continue;
        }
        if let Some(previous) = by_height.get(&summary.height) {
            if previous.hash != summary.hash {
                return Err(IndexerError::InvariantViolation(format!(
                    "node reported two finalized blocks at height {}: {} and {}",
                    summary.height, previous.hash, summary.hash
                )));
            }
            continue;
        }
        by_height.insert(summary.height, summary);
    }
    if let Some(missing) = (start..=end).find(|h| !by_height.contains_key(h)) {
        return Err(IndexerError::malformed(
            Some(missing),
            format!("node returned no summary (range {start}..={end})"),
        ));
    }
    Ok(by_height.into_values().collect())
}

fn check_detail(summary: &BlockSummary, mut block: RawBlock) -> Result<RawBlock, IndexerError> {
    if block.hash != summary.hash || block.height != summary.height {
        return Err(IndexerError::malformed(
            Some(summary.height),
            format!(
                "detail for {} came back as block {} ({})",
                summary.hash, block.height, block.hash
            ),
        ));
    }
    if block.skipped_deploys > 0 {
        tracing::warn!(
            block_height = block.height,
            block_hash = %block.hash,
            skipped = block.skipped_deploys,
            "unreadable deploy entries skipped"
        );
    }
    block.finalized = true;
    Ok(block)
}

fn at_height(err: NodeError, height: u64) -> IndexerError {
    match err {
        NodeError::NotFound(what) => IndexerError::malformed(Some(height), format!("block detail not found: {what}")),
        NodeError::Malformed { command, reason } => {
            IndexerError::malformed(Some(height), format!("{command}: {reason}"))
        }
        other => other.into(),
    }
}
