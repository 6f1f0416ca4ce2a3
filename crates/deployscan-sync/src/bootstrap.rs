//! Genesis bootstrap (runs once, while the cursor is unset).

use std::time::Duration;

use deployscan_core::cursor::SyncCursor;
use deployscan_core::error::IndexerError;
use deployscan_core::identity::KeyDirectory;
use deployscan_core::types::BlockCommit;
use deployscan_extract::{collect_genesis_keys, Extractor};
use deployscan_node::NodeClient;
use deployscan_storage::IndexStore;

use crate::fetch::fetch_blocks;

/// Parameters of the bootstrap phase.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapParams {
    /// Current finalized tip; the key scan never reaches past it.
    pub tip: u64,
    /// Number of blocks after genesis scanned for full validator keys.
    pub scan_depth: u64,
    pub min_key_fragment: usize,
    pub fetch_concurrency: usize,
    pub commit_timeout: Duration,
}

/// Fetch block 0, resolve its validator keys, derive the synthetic genesis
/// rows and commit them together with cursor `0`.
///
/// Returns the key directory built along the way so the first batch can
/// resolve abbreviated keys without scanning again.
pub async fn bootstrap_genesis(
    client: &dyn NodeClient,
    store: &dyn IndexStore,
    extractor: &Extractor,
    params: BootstrapParams,
) -> Result<KeyDirectory, IndexerError> {
    let mut fetched = fetch_blocks(client, 0, 0, 1).await?;
    let genesis = fetched
        .pop()
        .ok_or_else(|| IndexerError::malformed(Some(0), "node returned no genesis block"))?;

    let scan_end = params.scan_depth.min(params.tip);
    let early = if scan_end >= 1 {
        fetch_blocks(client, 1, scan_end, params.fetch_concurrency).await?
    } else {
        Vec::new()
    };

    let keys = collect_genesis_keys(&genesis, &early, params.min_key_fragment);
    let extracted = extractor.extract_block(&genesis, &keys);
    if !extracted.skipped.is_empty() {
        deployscan_core::metrics::record_deploys_skipped(extracted.skipped.len() as u64);
    }

    commit_with_timeout(store, &extracted.commit, SyncCursor::at(0), params.commit_timeout).await?;

    tracing::info!(
        hash = %genesis.hash,
        bonds = extracted.commit.bonds.len(),
        transfers = extracted.commit.transfers.len(),
        balances = extracted.commit.balances.len(),
        known_keys = keys.len(),
        scanned = early.len(),
        "Genesis bootstrap committed"
    );
    Ok(keys)
}

/// Run one atomic block commit under the per-transaction timeout.
///
/// On timeout the commit future is dropped, which rolls the transaction back.
pub async fn commit_with_timeout(
    store: &dyn IndexStore,
    commit: &BlockCommit,
    cursor: SyncCursor,
    timeout: Duration,
) -> Result<(), IndexerError> {
    match tokio::time::timeout(timeout, store.commit_block(commit, &cursor)).await {
        Ok(result) => result,
        Err(_) => Err(IndexerError::Timeout {
            operation: format!("commit of block {}", commit.height()),
            ms: timeout.as_millis() as u64,
        }),
    }
}
