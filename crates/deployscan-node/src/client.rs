//! The `NodeClient` trait: typed queries against a blockchain node.

use async_trait::async_trait;

use deployscan_core::raw::{BlockSummary, ConsensusStatus, EpochInfo, MainChainEntry, RawBlock, RawBond, RawDeploy};

use crate::error::NodeError;

/// Typed access to everything the indexer reads from the node.
///
/// Implementations must be `Send + Sync`; the sync engine shares one client
/// between the fetch loop and the reconciliation tasks behind an `Arc`.
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    /// The latest finalized block (the sync target).
    async fn last_finalized_block(&self) -> Result<BlockSummary, NodeError>;

    /// Headers for the inclusive range `start..=end`, ascending.
    async fn blocks_by_height(&self, start: u64, end: u64) -> Result<Vec<BlockSummary>, NodeError>;

    /// Full detail (deploys, bonds, justifications) for one block.
    async fn block(&self, hash: &str) -> Result<RawBlock, NodeError>;

    async fn deploy(&self, deploy_id: &str) -> Result<RawDeploy, NodeError>;

    /// Current bonds map.
    async fn bonds(&self) -> Result<Vec<RawBond>, NodeError>;

    /// Public keys of the current active validator set.
    async fn active_validators(&self) -> Result<Vec<String>, NodeError>;

    async fn epoch_info(&self) -> Result<EpochInfo, NodeError>;

    async fn consensus_status(&self) -> Result<ConsensusStatus, NodeError>;

    /// The last `depth` blocks of the node's main chain.
    async fn main_chain(&self, depth: u32) -> Result<Vec<MainChainEntry>, NodeError>;

    /// Cheap reachability probe.
    ///
    /// Default implementation asks for the last finalized block.
    async fn ping(&self) -> Result<(), NodeError> {
        self.last_finalized_block().await.map(|_| ())
    }

    /// Identifier used in logs (program name or test label).
    fn name(&self) -> &str;
}
