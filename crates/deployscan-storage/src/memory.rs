//! In-memory storage backend.
//!
//! Holds every table in one mutex-guarded state so a block commit is atomic
//! with respect to every reader. All data is lost when the process exits.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use deployscan_core::cursor::{SyncCursor, CURSOR_KEY};
use deployscan_core::error::IndexerError;
use deployscan_core::types::{
    BalanceState, Block, BlockCommit, Deployment, EpochTransition, NetworkStats, Transfer, Validator,
    ValidatorBond,
};

use crate::{IndexStore, SCHEMA_VERSION, SCHEMA_VERSION_KEY};

type TransferKey = (String, String, String, i64);

#[derive(Default)]
struct State {
    meta: HashMap<String, String>,
    blocks: BTreeMap<u64, Block>,
    deployments: BTreeMap<String, Deployment>,
    transfers: BTreeMap<TransferKey, Transfer>,
    bonds: BTreeMap<(u64, String), ValidatorBond>,
    balances: BTreeMap<(String, u64), BalanceState>,
    validators: BTreeMap<String, Validator>,
    network_stats: Vec<NetworkStats>,
    epochs: BTreeMap<u64, EpochTransition>,
}

impl State {
    fn cursor(&self) -> Result<SyncCursor, IndexerError> {
        SyncCursor::decode(self.meta.get(CURSOR_KEY).map(String::as_str))
    }

    fn set_cursor(&mut self, cursor: &SyncCursor) {
        match cursor.encode() {
            Some(v) => self.meta.insert(CURSOR_KEY.to_string(), v),
            None => self.meta.remove(CURSOR_KEY),
        };
    }

    fn upsert_validator(&mut self, v: &Validator) {
        match self.validators.get_mut(&v.public_key) {
            Some(existing) => {
                existing.observe(v.first_seen_block, Some(v.stake), Some(v.status));
                existing.observe(v.last_seen_block, None, None);
                if v.name.is_some() {
                    existing.name = v.name.clone();
                }
            }
            None => {
                self.validators.insert(v.public_key.clone(), v.clone());
            }
        }
    }
}

/// In-memory index store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, IndexerError> {
        self.state
            .lock()
            .map_err(|_| IndexerError::Storage("memory store lock poisoned".into()))
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        match self.state.lock() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    pub fn block(&self, height: u64) -> Option<Block> {
        self.read(|s| s.blocks.get(&height).cloned())
    }

    pub fn block_count(&self) -> usize {
        self.read(|s| s.blocks.len())
    }

    /// All deployments, ordered by deploy id.
    pub fn deployments(&self) -> Vec<Deployment> {
        self.read(|s| s.deployments.values().cloned().collect())
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.read(|s| s.transfers.values().cloned().collect())
    }

    pub fn bonds(&self) -> Vec<ValidatorBond> {
        self.read(|s| s.bonds.values().cloned().collect())
    }

    pub fn balances(&self) -> Vec<BalanceState> {
        self.read(|s| s.balances.values().cloned().collect())
    }

    pub fn network_stats(&self) -> Vec<NetworkStats> {
        self.read(|s| s.network_stats.clone())
    }

    pub fn epochs(&self) -> Vec<EpochTransition> {
        self.read(|s| s.epochs.values().cloned().collect())
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn init(&self) -> Result<(), IndexerError> {
        self.lock()?
            .meta
            .insert(SCHEMA_VERSION_KEY.to_string(), SCHEMA_VERSION.to_string());
        Ok(())
    }

    async fn load_cursor(&self) -> Result<SyncCursor, IndexerError> {
        self.lock()?.cursor()
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<(), IndexerError> {
        self.lock()?.set_cursor(cursor);
        Ok(())
    }

    async fn block_hash(&self, height: u64) -> Result<Option<String>, IndexerError> {
        Ok(self.lock()?.blocks.get(&height).map(|b| b.hash.clone()))
    }

    async fn block_hashes(&self, from: u64, to: u64) -> Result<Vec<(u64, String)>, IndexerError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .lock()?
            .blocks
            .range(from..=to)
            .map(|(h, b)| (*h, b.hash.clone()))
            .collect())
    }

    async fn commit_block(&self, commit: &BlockCommit, cursor: &SyncCursor) -> Result<(), IndexerError> {
        let mut s = self.lock()?;
        let current = s.cursor()?;
        if let (Some(cur), Some(new)) = (current.height(), cursor.height()) {
            if new < cur {
                return Err(IndexerError::InvariantViolation(format!(
                    "commit of block {} would move cursor back from {cur} to {new}",
                    commit.height()
                )));
            }
        }

        let height = commit.height();
        if let Some((other, _)) = s.blocks.iter().find(|(h, b)| **h != height && b.hash == commit.block.hash) {
            return Err(IndexerError::InvariantViolation(format!(
                "block hash {} is already stored at height {other}, not {height}",
                commit.block.hash
            )));
        }
        let mut block = commit.block.clone();
        for d in &commit.deployments {
            s.deployments.insert(d.deploy_id.clone(), d.clone());
        }
        block.deployment_count = s.deployments.values().filter(|d| d.block_height == height).count() as u32;
        s.blocks.insert(height, block);

        for t in &commit.transfers {
            let key = (
                t.deploy_id.clone(),
                t.from_address.clone(),
                t.to_address.clone(),
                t.amount_dust(),
            );
            s.transfers.insert(key, t.clone());
        }
        for b in &commit.bonds {
            s.bonds.insert((b.block_height, b.validator.clone()), b.clone());
        }
        for b in &commit.balances {
            s.balances.insert((b.address.clone(), b.block_height), b.clone());
        }
        for sighting in &commit.validators {
            match s.validators.get_mut(&sighting.public_key) {
                Some(v) => v.observe(sighting.height, sighting.stake, None),
                None => {
                    let v = sighting.clone().into_validator();
                    s.validators.insert(v.public_key.clone(), v);
                }
            }
        }
        s.set_cursor(cursor);
        Ok(())
    }

    async fn balance_before(&self, address: &str, height: u64) -> Result<Option<BalanceState>, IndexerError> {
        Ok(self
            .lock()?
            .balances
            .range((address.to_string(), 0)..(address.to_string(), height))
            .next_back()
            .map(|(_, b)| b.clone()))
    }

    async fn bonds_before(&self, height: u64) -> Result<Vec<ValidatorBond>, IndexerError> {
        let s = self.lock()?;
        let Some(((latest, _), _)) = s.bonds.range(..(height, String::new())).next_back() else {
            return Ok(Vec::new());
        };
        let latest = *latest;
        Ok(s.bonds
            .range((latest, String::new())..(latest + 1, String::new()))
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn validators(&self) -> Result<Vec<Validator>, IndexerError> {
        Ok(self.lock()?.validators.values().cloned().collect())
    }

    async fn upsert_validators(&self, validators: &[Validator]) -> Result<(), IndexerError> {
        let mut s = self.lock()?;
        for v in validators {
            s.upsert_validator(v);
        }
        Ok(())
    }

    async fn insert_network_stats(&self, stats: &NetworkStats) -> Result<(), IndexerError> {
        self.lock()?.network_stats.push(stats.clone());
        Ok(())
    }

    async fn latest_epoch(&self) -> Result<Option<EpochTransition>, IndexerError> {
        Ok(self.lock()?.epochs.values().next_back().cloned())
    }

    async fn insert_epoch_transition(&self, transition: &EpochTransition) -> Result<(), IndexerError> {
        self.lock()?
            .epochs
            .entry(transition.epoch_number)
            .or_insert_with(|| transition.clone());
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, IndexerError> {
        Ok(self.lock()?.meta.get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), IndexerError> {
        self.lock()?.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
