//! Block 0 special-casing.
//!
//! Genesis encodes its state structurally (a bonds map and an allocation
//! table) instead of as transfer transactions, so each entry is turned into a
//! synthetic deployment plus a transfer from [`GENESIS_SOURCE`].

use std::collections::{BTreeMap, HashSet};

use deployscan_core::identity::{is_abbreviated, KeyDirectory};
use deployscan_core::raw::RawBlock;
use deployscan_core::types::{
    BalanceState, BlockCommit, Deployment, DeploymentStatus, DeploymentType, Transfer,
    TransferStatus,
};

use crate::block::{block_row, bond_rows, resolve_bonds, sightings, Extracted, Extractor};

/// Sender recorded on synthetic genesis transfers.
pub const GENESIS_SOURCE: &str = "genesis";

/// Build the key directory used to resolve abbreviated keys at genesis.
///
/// Full keys are learned from every place a validator key shows up in the
/// genesis block and the early blocks after it: proposers, bond entries and
/// justifications.
pub fn collect_genesis_keys(genesis: &RawBlock, early_blocks: &[RawBlock], min_fragment: usize) -> KeyDirectory {
    let mut dir = KeyDirectory::new(min_fragment);
    for b in std::iter::once(genesis).chain(early_blocks) {
        dir.learn(&b.proposer);
        for bond in &b.bonds {
            dir.learn(&bond.validator);
        }
        for j in &b.justifications {
            dir.learn(&j.validator);
        }
    }
    let unresolved = genesis
        .bonds
        .iter()
        .filter(|b| is_abbreviated(&dir.resolve(&b.validator)))
        .count();
    if unresolved > 0 {
        tracing::warn!(
            unresolved,
            scanned = early_blocks.len(),
            "no full key found for some genesis validators; keeping abbreviated keys"
        );
    }
    dir
}

impl Extractor {
    /// Derive the bootstrap commit for block 0.
    ///
    /// Per bond: a `GenesisBond` deployment, a genesis transfer, a bond row
    /// and a bonded balance. Per allocation: a `GenesisMint` deployment, a
    /// genesis transfer and an unbonded balance. Any ordinary deploys carried
    /// by the block are extracted as usual.
    pub fn extract_genesis(&self, raw: &RawBlock, keys: &KeyDirectory) -> Extracted {
        let bonds = resolve_bonds(&raw.bonds, keys);
        let status = if raw.finalized {
            DeploymentStatus::Finalized
        } else {
            DeploymentStatus::Included
        };
        let synthetic = |id: String, kind: DeploymentType, term: String| {
            Deployment::new(
                id,
                raw.height,
                raw.hash.clone(),
                GENESIS_SOURCE,
                term,
                raw.timestamp,
                (0, 0, 0),
                None,
                kind,
                status,
            )
        };

        let mut deployments = Vec::new();
        let mut transfers = Vec::new();
        let mut balances: BTreeMap<String, BalanceState> = BTreeMap::new();
        let mut ids = HashSet::new();

        for (index, b) in bonds.iter().enumerate() {
            let id = unique_id(&mut ids, format!("genesis-bond-{}", b.validator), index);
            deployments.push(synthetic(
                id.clone(),
                DeploymentType::GenesisBond,
                format!("bond {} {}", b.validator, b.stake),
            ));
            transfers.push(Transfer::new(
                id,
                raw.height,
                GENESIS_SOURCE,
                b.validator.clone(),
                b.stake,
                TransferStatus::Genesis,
            ));
            balance_at(&mut balances, &b.validator, raw.height).bonded_dust += b.stake;
        }
        for (index, a) in raw.allocations.iter().enumerate() {
            let id = unique_id(&mut ids, format!("genesis-mint-{}", a.address), index);
            deployments.push(synthetic(
                id.clone(),
                DeploymentType::GenesisMint,
                format!("mint {} {}", a.address, a.amount_dust),
            ));
            transfers.push(Transfer::new(
                id,
                raw.height,
                GENESIS_SOURCE,
                a.address.clone(),
                a.amount_dust,
                TransferStatus::Genesis,
            ));
            balance_at(&mut balances, &a.address, raw.height).unbonded_dust += a.amount_dust;
        }

        let mut commit = BlockCommit {
            block: block_row(raw, keys, &bonds),
            deployments,
            transfers,
            bonds: bond_rows(raw, &bonds),
            balances: balances.into_values().collect(),
            validators: sightings(raw.height, &keys.resolve(&raw.proposer), &bonds),
        };
        let skipped = self.extract_deploys(raw, &mut commit);
        tracing::info!(
            bonds = commit.bonds.len(),
            allocations = raw.allocations.len(),
            balances = commit.balances.len(),
            "genesis extracted"
        );
        Extracted { commit, skipped }
    }
}

/// Two entries for one key get distinct ids: the repeat is suffixed with its
/// position in the genesis list.
fn unique_id(used: &mut HashSet<String>, id: String, index: usize) -> String {
    if used.insert(id.clone()) {
        return id;
    }
    tracing::warn!(%id, index, "duplicate genesis entry for one key; suffixing its id");
    let suffixed = format!("{id}-{index}");
    used.insert(suffixed.clone());
    suffixed
}

fn balance_at<'a>(balances: &'a mut BTreeMap<String, BalanceState>, address: &str, height: u64) -> &'a mut BalanceState {
    balances.entry(address.to_string()).or_insert_with(|| BalanceState {
        address: address.to_string(),
        block_height: height,
        bonded_dust: 0,
        unbonded_dust: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::tests::{key, raw_block, ALICE};
    use deployscan_core::config::AddressRules;
    use deployscan_core::raw::{GenesisAllocation, RawBond};

    fn genesis_with_bonds(n: u8) -> RawBlock {
        let mut g = raw_block(0, vec![]);
        g.parent_hash = String::new();
        g.bonds = (1..=n)
            .map(|i| RawBond {
                validator: key(i),
                stake: 1_000 * i as i64,
            })
            .collect();
        g
    }

    #[test]
    fn three_bonds_three_rows() {
        let g = genesis_with_bonds(3);
        let keys = collect_genesis_keys(&g, &[], 6);
        let out = Extractor::new(AddressRules::default()).unwrap().extract_block(&g, &keys);
        let c = out.commit;
        assert_eq!(c.bonds.len(), 3);
        assert_eq!(c.transfers.len(), 3);
        assert!(c.transfers.iter().all(|t| t.status == TransferStatus::Genesis && t.from_address == GENESIS_SOURCE));
        assert!(c.deployments.iter().all(|d| d.deployment_type == DeploymentType::GenesisBond));
        assert_eq!(c.balances.len(), 3);
        assert!(c.balances.iter().all(|b| b.block_height == 0 && b.unbonded_dust == 0));
        assert_eq!(c.balances.iter().map(|b| b.bonded_dust).sum::<i64>(), 6_000);
    }

    #[test]
    fn allocations_become_mints() {
        let mut g = genesis_with_bonds(1);
        g.allocations = vec![GenesisAllocation {
            address: ALICE.into(),
            amount_dust: 5_000_000_000,
        }];
        let keys = collect_genesis_keys(&g, &[], 6);
        let c = Extractor::new(AddressRules::default()).unwrap().extract_genesis(&g, &keys).commit;
        let mint = c
            .deployments
            .iter()
            .find(|d| d.deployment_type == DeploymentType::GenesisMint)
            .unwrap();
        assert_eq!(mint.deploy_id, format!("genesis-mint-{ALICE}"));
        let bal = c.balances.iter().find(|b| b.address == ALICE).unwrap();
        assert_eq!(bal.unbonded_dust, 5_000_000_000);
        assert_eq!(bal.total_rev().to_string(), "50.00000000");
    }

    #[test]
    fn abbreviated_genesis_keys_resolved_from_early_blocks() {
        let full = key(4);
        let abbreviated = format!("{}...{}", &full[..8], &full[full.len() - 4..]);
        let mut g = raw_block(0, vec![]);
        g.bonds = vec![RawBond {
            validator: abbreviated.clone(),
            stake: 10,
        }];
        g.proposer = String::new();
        let mut early = raw_block(1, vec![]);
        early.proposer = full.clone();

        let keys = collect_genesis_keys(&g, &[early], 6);
        let c = Extractor::new(AddressRules::default()).unwrap().extract_genesis(&g, &keys).commit;
        assert_eq!(c.bonds[0].validator, full);

        let keys = collect_genesis_keys(&g, &[], 6);
        let c = Extractor::new(AddressRules::default()).unwrap().extract_genesis(&g, &keys).commit;
        assert_eq!(c.bonds[0].validator, abbreviated, "falls back to the abbreviated key");
    }

    #[test]
    fn repeated_bond_key_gets_distinct_ids() {
        let full = key(2);
        let abbreviated = format!("{}...{}", &full[..8], &full[full.len() - 4..]);
        let mut g = genesis_with_bonds(2);
        g.bonds.push(RawBond {
            validator: abbreviated,
            stake: 5,
        });
        let keys = collect_genesis_keys(&g, &[], 6);
        let c = Extractor::new(AddressRules::default()).unwrap().extract_genesis(&g, &keys).commit;

        let ids: HashSet<&str> = c.deployments.iter().map(|d| d.deploy_id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(format!("genesis-bond-{full}").as_str()));
        assert!(ids.contains(format!("genesis-bond-{full}-2").as_str()));
        let bal = c.balances.iter().find(|b| b.address == full).unwrap();
        assert_eq!(bal.bonded_dust, 2_005);
    }
}
