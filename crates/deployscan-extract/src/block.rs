//! Per-block extraction: one [`RawBlock`] in, one [`BlockCommit`] out.

use std::collections::HashSet;

use deployscan_core::config::AddressRules;
use deployscan_core::error::IndexerError;
use deployscan_core::identity::KeyDirectory;
use deployscan_core::raw::{RawBlock, RawBond, RawDeploy};
use deployscan_core::types::{
    normalize_error_message, Block, BlockCommit, Deployment, DeploymentStatus, Transfer,
    ValidatorBond, ValidatorSighting,
};

use crate::address::AddressValidator;
use crate::classify::classify;
use crate::transfers::TransferExtractor;

/// A deploy that was left out of the commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDeploy {
    pub deploy_id: String,
    pub reason: String,
}

/// Result of extracting one block.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub commit: BlockCommit,
    pub skipped: Vec<SkippedDeploy>,
}

/// Stateless extractor; cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Extractor {
    addresses: AddressValidator,
    transfers: TransferExtractor,
}

impl Extractor {
    pub fn new(rules: AddressRules) -> Result<Self, IndexerError> {
        let addresses = AddressValidator::new(rules);
        Ok(Self {
            transfers: TransferExtractor::new(addresses.clone())?,
            addresses,
        })
    }

    pub fn addresses(&self) -> &AddressValidator {
        &self.addresses
    }

    /// Derive every row of an ordinary block.
    ///
    /// Block 0 is routed to [`Extractor::extract_genesis`]. Balance snapshots
    /// are left empty: they depend on stored state and are filled at commit
    /// time.
    pub fn extract_block(&self, raw: &RawBlock, keys: &KeyDirectory) -> Extracted {
        if raw.is_genesis() {
            return self.extract_genesis(raw, keys);
        }

        let bonds = resolve_bonds(&raw.bonds, keys);
        let mut commit = BlockCommit {
            block: block_row(raw, keys, &bonds),
            deployments: Vec::with_capacity(raw.deploys.len()),
            transfers: Vec::new(),
            bonds: bond_rows(raw, &bonds),
            balances: Vec::new(),
            validators: sightings(raw.height, &keys.resolve(&raw.proposer), &bonds),
        };
        let skipped = self.extract_deploys(raw, &mut commit);
        Extracted { commit, skipped }
    }

    /// Append the deployments and transfers of `raw` to `commit`.
    pub(crate) fn extract_deploys(&self, raw: &RawBlock, commit: &mut BlockCommit) -> Vec<SkippedDeploy> {
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();
        for d in &raw.deploys {
            let reason = if d.deploy_id.trim().is_empty() {
                Some("empty deploy id")
            } else if !seen.insert(d.deploy_id.as_str()) {
                Some("duplicate deploy id in block")
            } else {
                None
            };
            if let Some(reason) = reason {
                tracing::warn!(block_height = raw.height, deploy_id = %d.deploy_id, reason, "skipping deploy");
                skipped.push(SkippedDeploy {
                    deploy_id: d.deploy_id.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }
            let (deployment, transfers) = self.extract_deploy(raw, d);
            commit.deployments.push(deployment);
            commit.transfers.extend(transfers);
        }
        skipped
    }

    fn extract_deploy(&self, raw: &RawBlock, d: &RawDeploy) -> (Deployment, Vec<Transfer>) {
        let error_message = normalize_error_message(d.error_message.as_deref());
        if d.errored != error_message.is_some() {
            tracing::debug!(
                block_height = raw.height,
                deploy_id = %d.deploy_id,
                node_errored = d.errored,
                "node error flag disagrees with error message; using the message"
            );
        }
        let status = if raw.finalized {
            DeploymentStatus::Finalized
        } else {
            DeploymentStatus::Included
        };
        let deployment = Deployment::new(
            d.deploy_id.clone(),
            raw.height,
            raw.hash.clone(),
            d.deployer.clone(),
            d.term.clone(),
            d.timestamp,
            (d.phlo_price, d.phlo_limit, d.cost),
            error_message,
            classify(&d.term),
            status,
        );
        let transfers = self.transfers.extract(
            &d.deploy_id,
            raw.height,
            &d.deployer,
            &d.term,
            deployment.errored(),
        );
        (deployment, transfers)
    }
}

pub(crate) fn resolve_bonds(bonds: &[RawBond], keys: &KeyDirectory) -> Vec<RawBond> {
    bonds
        .iter()
        .map(|b| RawBond {
            validator: keys.resolve(&b.validator),
            stake: b.stake,
        })
        .collect()
}

pub(crate) fn block_row(raw: &RawBlock, keys: &KeyDirectory, bonds: &[RawBond]) -> Block {
    Block {
        height: raw.height,
        hash: raw.hash.clone(),
        parent_hash: raw.parent_hash.clone(),
        timestamp: raw.timestamp,
        proposer: keys.resolve(&raw.proposer),
        pre_state_hash: raw.pre_state_hash.clone(),
        post_state_hash: raw.post_state_hash.clone(),
        finalized: raw.finalized,
        fault_tolerance: raw.fault_tolerance,
        bonds: bonds.to_vec(),
        justifications: raw.justifications.clone(),
        deployment_count: 0,
    }
}

pub(crate) fn bond_rows(raw: &RawBlock, bonds: &[RawBond]) -> Vec<ValidatorBond> {
    bonds
        .iter()
        .map(|b| ValidatorBond {
            block_height: raw.height,
            block_hash: raw.hash.clone(),
            validator: b.validator.clone(),
            stake: b.stake,
        })
        .collect()
}

/// Proposer first, then bonded validators; one sighting per identity.
pub(crate) fn sightings(height: u64, proposer: &str, bonds: &[RawBond]) -> Vec<ValidatorSighting> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    if !proposer.is_empty() && seen.insert(proposer.to_string()) {
        out.push(ValidatorSighting {
            public_key: proposer.to_string(),
            stake: bonds.iter().find(|b| b.validator == proposer).map(|b| b.stake),
            height,
        });
    }
    for b in bonds {
        if seen.insert(b.validator.clone()) {
            out.push(ValidatorSighting {
                public_key: b.validator.clone(),
                stake: Some(b.stake),
                height,
            });
        }
    }
    out
}
