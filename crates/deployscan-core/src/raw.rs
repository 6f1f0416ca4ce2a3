//! Records as reported by the node, before extraction.
//!
//! These are the typed results of the Node Query Client. Field names follow
//! the indexer's vocabulary, not any particular output format of the CLI; the
//! parsers in `deployscan-node` map every known format onto these.

use serde::{Deserialize, Serialize};

/// Light block header returned by range queries (first fetch phase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
    /// Milliseconds since the Unix epoch, as the node reports it.
    pub timestamp: i64,
    pub proposer: String,
    pub deploy_count: u32,
}

/// One entry of a block's bonds map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBond {
    pub validator: String,
    pub stake: i64,
}

/// A validator's latest-message pointer carried in the block justification set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justification {
    pub validator: String,
    pub latest_block_hash: String,
}

/// A genesis wallet allocation (only present on block 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: String,
    pub amount_dust: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDeploy {
    /// Deploy signature; acts as the content-addressed deploy id.
    pub deploy_id: String,
    pub deployer: String,
    pub term: String,
    pub timestamp: i64,
    pub phlo_price: i64,
    pub phlo_limit: i64,
    pub cost: i64,
    /// Error flag as reported by the node. Informational only: the stored
    /// flag is derived from `error_message`.
    pub errored: bool,
    pub error_message: Option<String>,
}

/// Full block detail (second fetch phase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: i64,
    pub proposer: String,
    pub pre_state_hash: String,
    pub post_state_hash: String,
    pub finalized: bool,
    pub fault_tolerance: f64,
    pub bonds: Vec<RawBond>,
    pub justifications: Vec<Justification>,
    pub deploys: Vec<RawDeploy>,
    #[serde(default)]
    pub allocations: Vec<GenesisAllocation>,
    /// Deploy entries the parser could not read; they are logged and skipped.
    #[serde(default)]
    pub skipped_deploys: u32,
}

impl RawBlock {
    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            height: self.height,
            hash: self.hash.clone(),
            parent_hash: self.parent_hash.clone(),
            timestamp: self.timestamp,
            proposer: self.proposer.clone(),
            deploy_count: self.deploys.len() as u32,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub current_epoch: u64,
    pub epoch_length: u64,
    pub quarantine_length: u64,
    /// First block height of the current epoch.
    pub start_block: u64,
}

impl EpochInfo {
    /// Last block height of the current epoch (inclusive).
    pub fn end_block(&self) -> u64 {
        self.start_block + self.epoch_length.saturating_sub(1)
    }
}

/// Point-in-time consensus view reported by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStatus {
    pub last_finalized_height: u64,
    pub total_validators: u32,
    pub active_validators: u32,
    pub quarantined_validators: u32,
    pub fault_tolerance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainChainEntry {
    pub height: u64,
    pub hash: String,
}
