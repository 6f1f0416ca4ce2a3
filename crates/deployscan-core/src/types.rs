//! Persisted row types.
//!
//! Blocks and deployments are written once per sync pass; transfers, bonds
//! and balance snapshots are derived rows committed with their parent block.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::raw::{Justification, RawBond};

/// Minor units ("dust") per major unit.
pub const DUST_PER_REV: i64 = 100_000_000;

const REV_SCALE: u32 = 8;

/// An empty or whitespace-only error message is the same as no message.
pub fn normalize_error_message(message: Option<&str>) -> Option<String> {
    message.map(str::trim).filter(|m| !m.is_empty()).map(str::to_string)
}

/// Exact dust → REV conversion (`dust / 10^8`).
pub fn dust_to_rev(dust: i64) -> Decimal {
    Decimal::new(dust, REV_SCALE)
}

// ─── Block ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
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
    /// Maintained by the store from the deployment rows; ignored on write.
    #[serde(default)]
    pub deployment_count: u32,
}

// ─── Deployment ───────────────────────────────────────────────────────────────

/// Deployment classification tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentType {
    TokenTransfer,
    ValidatorOperation,
    FinalizerContract,
    RegistryLookup,
    AuctionContract,
    SmartContract,
    GenesisMint,
    GenesisBond,
}

impl DeploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenTransfer => "token_transfer",
            Self::ValidatorOperation => "validator_operation",
            Self::FinalizerContract => "finalizer_contract",
            Self::RegistryLookup => "registry_lookup",
            Self::AuctionContract => "auction_contract",
            Self::SmartContract => "smart_contract",
            Self::GenesisMint => "genesis_mint",
            Self::GenesisBond => "genesis_bond",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "token_transfer" => Self::TokenTransfer,
            "validator_operation" => Self::ValidatorOperation,
            "finalizer_contract" => Self::FinalizerContract,
            "registry_lookup" => Self::RegistryLookup,
            "auction_contract" => Self::AuctionContract,
            "smart_contract" => Self::SmartContract,
            "genesis_mint" => Self::GenesisMint,
            "genesis_bond" => Self::GenesisBond,
            _ => return None,
        })
    }
}

impl std::fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Included in a block that is not yet finalized.
    Included,
    Finalized,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Included => "included",
            Self::Finalized => "finalized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub deploy_id: String,
    pub block_height: u64,
    pub block_hash: String,
    pub deployer: String,
    pub term: String,
    pub timestamp: i64,
    pub phlo_price: i64,
    pub phlo_limit: i64,
    pub phlo_cost: i64,
    errored: bool,
    error_message: Option<String>,
    pub deployment_type: DeploymentType,
    pub status: DeploymentStatus,
}

impl Deployment {
    /// Build a deployment row. `errored` is derived from `error_message`:
    /// an empty or whitespace-only message is the same as no message.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        deploy_id: impl Into<String>,
        block_height: u64,
        block_hash: impl Into<String>,
        deployer: impl Into<String>,
        term: impl Into<String>,
        timestamp: i64,
        phlo: (i64, i64, i64),
        error_message: Option<String>,
        deployment_type: DeploymentType,
        status: DeploymentStatus,
    ) -> Self {
        let mut d = Self {
            deploy_id: deploy_id.into(),
            block_height,
            block_hash: block_hash.into(),
            deployer: deployer.into(),
            term: term.into(),
            timestamp,
            phlo_price: phlo.0,
            phlo_limit: phlo.1,
            phlo_cost: phlo.2,
            errored: false,
            error_message: None,
            deployment_type,
            status,
        };
        d.set_error(error_message);
        d
    }

    pub fn set_error(&mut self, message: Option<String>) {
        self.error_message = normalize_error_message(message.as_deref());
        self.errored = self.error_message.is_some();
    }

    pub fn errored(&self) -> bool {
        self.errored
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

// ─── Transfer ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Success,
    /// The parent deployment errored; the transfer was attempted, not applied.
    Failed,
    Genesis,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Genesis => "genesis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub deploy_id: String,
    pub block_height: u64,
    pub from_address: String,
    pub to_address: String,
    amount_dust: i64,
    amount_rev: Decimal,
    pub status: TransferStatus,
}

impl Transfer {
    pub fn new(
        deploy_id: impl Into<String>,
        block_height: u64,
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        amount_dust: i64,
        status: TransferStatus,
    ) -> Self {
        Self {
            deploy_id: deploy_id.into(),
            block_height,
            from_address: from_address.into(),
            to_address: to_address.into(),
            amount_dust,
            amount_rev: dust_to_rev(amount_dust),
            status,
        }
    }

    pub fn amount_dust(&self) -> i64 {
        self.amount_dust
    }

    pub fn amount_rev(&self) -> Decimal {
        self.amount_rev
    }

    /// Identity used to collapse duplicate candidates within one deploy.
    pub fn dedup_key(&self) -> (&str, &str, &str, i64) {
        (&self.deploy_id, &self.from_address, &self.to_address, self.amount_dust)
    }
}

// ─── Validators ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    Bonded,
    Active,
    Quarantined,
    Inactive,
}

impl ValidatorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bonded => "bonded",
            Self::Active => "active",
            Self::Quarantined => "quarantined",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "bonded" => Self::Bonded,
            "active" => Self::Active,
            "quarantined" => Self::Quarantined,
            "inactive" => Self::Inactive,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub public_key: String,
    pub name: Option<String>,
    pub stake: i64,
    pub first_seen_block: u64,
    pub last_seen_block: u64,
    pub status: ValidatorStatus,
}

impl Validator {
    /// Fold a later observation into this row, keeping `first ≤ last`.
    pub fn observe(&mut self, height: u64, stake: Option<i64>, status: Option<ValidatorStatus>) {
        self.first_seen_block = self.first_seen_block.min(height);
        self.last_seen_block = self.last_seen_block.max(height);
        if let Some(stake) = stake {
            self.stake = stake;
        }
        if let Some(status) = status {
            self.status = status;
        }
    }
}

/// A validator observed while processing a block (proposer or bond entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSighting {
    pub public_key: String,
    pub stake: Option<i64>,
    pub height: u64,
}

impl ValidatorSighting {
    pub fn into_validator(self) -> Validator {
        Validator {
            public_key: self.public_key,
            name: None,
            stake: self.stake.unwrap_or(0),
            first_seen_block: self.height,
            last_seen_block: self.height,
            status: if self.stake.is_some() {
                ValidatorStatus::Bonded
            } else {
                ValidatorStatus::Active
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorBond {
    pub block_height: u64,
    pub block_hash: String,
    pub validator: String,
    pub stake: i64,
}

// ─── Balances ─────────────────────────────────────────────────────────────────

/// Per-address balance snapshot at a block. `total` is always derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceState {
    pub address: String,
    pub block_height: u64,
    pub bonded_dust: i64,
    pub unbonded_dust: i64,
}

impl BalanceState {
    pub fn total_dust(&self) -> i64 {
        self.bonded_dust + self.unbonded_dust
    }

    pub fn bonded_rev(&self) -> Decimal {
        dust_to_rev(self.bonded_dust)
    }

    pub fn unbonded_rev(&self) -> Decimal {
        dust_to_rev(self.unbonded_dust)
    }

    pub fn total_rev(&self) -> Decimal {
        dust_to_rev(self.total_dust())
    }
}

// ─── Reconciliation snapshots ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub block_height: u64,
    pub recorded_at: DateTime<Utc>,
    pub total_validators: u32,
    pub active_validators: u32,
    pub quarantined_validators: u32,
    pub total_bonded_dust: i64,
    pub last_finalized_height: u64,
    pub fault_tolerance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochTransition {
    pub epoch_number: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub epoch_length: u64,
    pub active_validators: u32,
    pub detected_at_height: u64,
    pub recorded_at: DateTime<Utc>,
}

// ─── Commit unit ──────────────────────────────────────────────────────────────

/// Everything derived from one block, written as a single atomic unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockCommit {
    pub block: Block,
    pub deployments: Vec<Deployment>,
    pub transfers: Vec<Transfer>,
    pub bonds: Vec<ValidatorBond>,
    pub balances: Vec<BalanceState>,
    pub validators: Vec<ValidatorSighting>,
}

impl BlockCommit {
    pub fn height(&self) -> u64 {
        self.block.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dust_to_rev_is_exact() {
        assert_eq!(dust_to_rev(100_000_000).to_string(), "1.00000000");
        assert_eq!(dust_to_rev(1).to_string(), "0.00000001");
        assert_eq!(dust_to_rev(123_456_789_012).to_string(), "1234.56789012");
    }

    #[test]
    fn transfer_amount_representations_agree() {
        for dust in [0i64, 1, 99, 500, 100_000_000, 7_777_777_777, i64::MAX / 1000] {
            let t = Transfer::new("d", 1, "a", "b", dust, TransferStatus::Success);
            let back = t.amount_rev() * Decimal::from(DUST_PER_REV);
            assert_eq!(back.round(), Decimal::from(t.amount_dust()));
        }
    }

    #[test]
    fn empty_error_message_is_not_an_error() {
        let d = Deployment::new(
            "sig", 3, "h", "dep", "Nil", 0, (1, 1000, 10),
            Some(String::new()),
            DeploymentType::SmartContract,
            DeploymentStatus::Included,
        );
        assert!(!d.errored());
        assert_eq!(d.error_message(), None);
    }

    #[test]
    fn non_empty_error_message_sets_errored() {
        let mut d = Deployment::new(
            "sig", 3, "h", "dep", "Nil", 0, (1, 1000, 10),
            None,
            DeploymentType::SmartContract,
            DeploymentStatus::Included,
        );
        assert!(!d.errored());
        d.set_error(Some("  out of phlo ".into()));
        assert!(d.errored());
        assert_eq!(d.error_message(), Some("out of phlo"));
        d.set_error(Some("   ".into()));
        assert!(!d.errored());
    }

    #[test]
    fn balance_total_is_derived() {
        let b = BalanceState {
            address: "1111x".into(),
            block_height: 0,
            bonded_dust: 250,
            unbonded_dust: 750,
        };
        assert_eq!(b.total_dust(), 1000);
        assert_eq!(b.total_rev().to_string(), "0.00001000");
    }

    #[test]
    fn validator_observe_keeps_seen_order() {
        let mut v = ValidatorSighting {
            public_key: "04ab".into(),
            stake: Some(10),
            height: 50,
        }
        .into_validator();
        v.observe(20, None, None);
        v.observe(90, Some(30), Some(ValidatorStatus::Active));
        assert_eq!(v.first_seen_block, 20);
        assert_eq!(v.last_seen_block, 90);
        assert_eq!(v.stake, 30);
        assert_eq!(v.status, ValidatorStatus::Active);
    }

    #[test]
    fn deployment_type_roundtrips_through_str() {
        for t in [
            DeploymentType::TokenTransfer,
            DeploymentType::ValidatorOperation,
            DeploymentType::GenesisBond,
        ] {
            assert_eq!(DeploymentType::parse(t.as_str()), Some(t));
        }
        assert_eq!(DeploymentType::parse("bogus"), None);
    }
}
