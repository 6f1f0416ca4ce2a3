//! Background reconciliation tasks.
//!
//! After every committed batch the engine asks the [`Reconciler`] which tasks
//! are due. A task is due when the batch crossed a multiple of its modulus.
//! Due tasks run on spawned Tokio tasks and may overlap the next fetch; a task
//! whose previous run is still in flight is skipped for that trigger.
//! Failures are logged and counted but never touch the cursor.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use deployscan_core::config::ReconcileConfig;
use deployscan_core::error::IndexerError;
use deployscan_core::identity::{is_abbreviated, KeyDirectory};
use deployscan_core::metrics;
use deployscan_core::types::{EpochTransition, NetworkStats, Validator, ValidatorStatus};
use deployscan_node::NodeClient;
use deployscan_storage::IndexStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileTask {
    Validators,
    Epoch,
    NetworkStats,
    MainChain,
}

impl ReconcileTask {
    pub const ALL: [Self; 4] = [Self::Validators, Self::Epoch, Self::NetworkStats, Self::MainChain];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validators => "validators",
            Self::Epoch => "epoch",
            Self::NetworkStats => "network_stats",
            Self::MainChain => "main_chain",
        }
    }

    pub fn modulus(&self, config: &ReconcileConfig) -> u64 {
        match self {
            Self::Validators => config.validators_every,
            Self::Epoch => config.epoch_every,
            Self::NetworkStats => config.stats_every,
            Self::MainChain => config.main_chain_every,
        }
    }

    fn slot(&self) -> usize {
        match self {
            Self::Validators => 0,
            Self::Epoch => 1,
            Self::NetworkStats => 2,
            Self::MainChain => 3,
        }
    }
}

impl std::fmt::Display for ReconcileTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tasks whose modulus was crossed when the cursor moved from `previous` to
/// `committed`. Genesis (`previous = None`) counts as height 0.
pub fn due_tasks(config: &ReconcileConfig, previous: Option<u64>, committed: u64) -> Vec<ReconcileTask> {
    let previous = previous.unwrap_or(0);
    ReconcileTask::ALL
        .into_iter()
        .filter(|task| {
            let n = task.modulus(config);
            n > 0 && committed / n > previous / n
        })
        .collect()
}

/// Clears the running flag of a task when its run ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Spawns due reconciliation tasks, at most one in flight per task type.
pub struct Reconciler {
    client: Arc<dyn NodeClient>,
    store: Arc<dyn IndexStore>,
    config: ReconcileConfig,
    min_key_fragment: usize,
    running: [Arc<AtomicBool>; 4],
    handles: Vec<JoinHandle<()>>,
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn NodeClient>,
        store: Arc<dyn IndexStore>,
        config: ReconcileConfig,
        min_key_fragment: usize,
    ) -> Self {
        Self {
            client,
            store,
            config,
            min_key_fragment,
            running: Default::default(),
            handles: Vec::new(),
        }
    }

    pub fn is_running(&self, task: ReconcileTask) -> bool {
        self.running[task.slot()].load(Ordering::Acquire)
    }

    /// Spawn every task due for the move `previous -> committed`.
    ///
    /// Returns the tasks actually started (due tasks still running from an
    /// earlier trigger are skipped).
    pub fn schedule(&mut self, previous: Option<u64>, committed: u64) -> Vec<ReconcileTask> {
        self.handles.retain(|h| !h.is_finished());

        let mut started = Vec::new();
        for task in due_tasks(&self.config, previous, committed) {
            let flag = Arc::clone(&self.running[task.slot()]);
            if flag.swap(true, Ordering::AcqRel) {
                tracing::debug!(task = task.as_str(), height = committed, "previous run still in flight, skipping");
                continue;
            }
            let client = Arc::clone(&self.client);
            let store = Arc::clone(&self.store);
            let config = self.config.clone();
            let min_key_fragment = self.min_key_fragment;
            self.handles.push(tokio::spawn(async move {
                let _guard = RunningGuard(flag);
                let result =
                    run_task(task, client.as_ref(), store.as_ref(), &config, min_key_fragment, committed).await;
                if let Err(e) = result {
                    metrics::record_error(e.category());
                    tracing::warn!(task = task.as_str(), height = committed, error = %e, "reconciliation task failed");
                }
            }));
            started.push(task);
        }
        started
    }

    /// Wait for every spawned task to finish.
    pub async fn drain(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "reconciliation task panicked or was cancelled");
            }
        }
    }
}

/// Run one task to completion against `height`.
pub async fn run_task(
    task: ReconcileTask,
    client: &dyn NodeClient,
    store: &dyn IndexStore,
    config: &ReconcileConfig,
    min_key_fragment: usize,
    height: u64,
) -> Result<(), IndexerError> {
    tracing::debug!(task = task.as_str(), height, "reconciliation started");
    match task {
        ReconcileTask::Validators => refresh_validators(client, store, height, min_key_fragment)
            .await
            .map(|_| ()),
        ReconcileTask::Epoch => check_epoch(client, store, height).await.map(|_| ()),
        ReconcileTask::NetworkStats => snapshot_network_stats(client, store, height).await.map(|_| ()),
        ReconcileTask::MainChain => verify_main_chain(client, store, height, config.main_chain_window)
            .await
            .map(|_| ()),
    }
}

// ─── Validators ───────────────────────────────────────────────────────────────

/// Outcome of a validator refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorRefresh {
    pub bonded: usize,
    pub active: usize,
    /// Rows marked inactive because the validator left the bonds map.
    pub retired: usize,
    /// Abbreviated rows folded into their full key.
    pub merged: usize,
}

/// Rebuild validator rows from the node's bonds map and active set.
///
/// Identities go through a [`KeyDirectory`] seeded with every stored key, so
/// abbreviated forms land on the full-key row once that key is known. A
/// stored abbreviated row that now resolves hands its history to the full
/// row and is marked inactive. Stored validators missing from both the bonds
/// map and the active set are marked inactive.
pub async fn refresh_validators(
    client: &dyn NodeClient,
    store: &dyn IndexStore,
    height: u64,
    min_key_fragment: usize,
) -> Result<ValidatorRefresh, IndexerError> {
    let bonds = client.bonds().await?;
    let active = client.active_validators().await?;
    let stored = store.validators().await?;

    let mut keys = KeyDirectory::new(min_key_fragment);
    stored.iter().for_each(|v| keys.learn(&v.public_key));
    bonds.iter().for_each(|b| keys.learn(&b.validator));
    active.iter().for_each(|k| keys.learn(k));

    let active: BTreeSet<String> = active.iter().map(|k| keys.resolve(k)).collect();
    let stored_stake: BTreeMap<&str, i64> = stored.iter().map(|v| (v.public_key.as_str(), v.stake)).collect();

    let mut current: BTreeMap<String, Validator> = BTreeMap::new();
    for bond in &bonds {
        let key = keys.resolve(&bond.validator);
        let status = if active.contains(&key) {
            ValidatorStatus::Active
        } else {
            ValidatorStatus::Bonded
        };
        current.insert(key.clone(), fresh(key, bond.stake, height, status));
    }
    for key in &active {
        if !current.contains_key(key) {
            let stake = stored_stake.get(key.as_str()).copied().unwrap_or(0);
            current.insert(key.clone(), fresh(key.clone(), stake, height, ValidatorStatus::Active));
        }
    }
    let mut report = ValidatorRefresh {
        bonded: bonds.len(),
        active: active.len(),
        ..Default::default()
    };

    let merged_away = |v: &Validator| is_abbreviated(&v.public_key) && keys.resolve(&v.public_key) != v.public_key;

    // Abbreviated rows that now resolve: retired under their own key, with
    // their history folded into the full-key row below.
    let mut retired = Vec::new();
    let mut folded: BTreeMap<String, Vec<&Validator>> = BTreeMap::new();
    for old in stored.iter().filter(|v| merged_away(v)) {
        let full = keys.resolve(&old.public_key);
        tracing::info!(abbreviated = %old.public_key, full = %full, "merged abbreviated validator row");
        report.merged += 1;
        retired.push(Validator {
            status: ValidatorStatus::Inactive,
            ..old.clone()
        });
        folded.entry(full).or_default().push(old);
    }

    for old in stored.iter().filter(|v| !merged_away(v)) {
        if current.contains_key(&old.public_key) {
            continue;
        }
        let history = folded.remove(&old.public_key);
        if old.status != ValidatorStatus::Inactive {
            tracing::info!(validator = %old.public_key, height, "validator left the bonds map, marking inactive");
            report.retired += 1;
        } else if history.is_none() {
            continue;
        }
        let mut row = Validator {
            status: ValidatorStatus::Inactive,
            ..old.clone()
        };
        for h in history.iter().flatten() {
            fold_history(&mut row, h);
        }
        retired.push(row);
    }

    for (full, history) in folded {
        match current.get_mut(&full) {
            Some(row) => {
                for h in &history {
                    fold_history(row, h);
                }
            }
            None => {
                let Some((first, rest)) = history.split_first() else {
                    continue;
                };
                let mut row = Validator {
                    public_key: full,
                    status: ValidatorStatus::Inactive,
                    ..(*first).clone()
                };
                for h in rest {
                    fold_history(&mut row, h);
                }
                retired.push(row);
            }
        }
    }

    let rows: Vec<Validator> = current.into_values().chain(retired).collect();
    store.upsert_validators(&rows).await?;
    tracing::info!(
        height,
        bonded = report.bonded,
        active = report.active,
        retired = report.retired,
        merged = report.merged,
        "Validator set reconciled"
    );
    Ok(report)
}

/// Carry the sighting history of a merged abbreviated row. Stake, status and
/// `last_seen_block` stay with the full-key row.
fn fold_history(row: &mut Validator, abbreviated: &Validator) {
    row.first_seen_block = row.first_seen_block.min(abbreviated.first_seen_block);
    if row.name.is_none() {
        row.name = abbreviated.name.clone();
    }
}

fn fresh(public_key: String, stake: i64, height: u64, status: ValidatorStatus) -> Validator {
    Validator {
        public_key,
        name: None,
        stake,
        first_seen_block: height,
        last_seen_block: height,
        status,
    }
}

// ─── Epoch ────────────────────────────────────────────────────────────────────

/// Record a transition when the node reports an epoch newer than the latest
/// stored one.
pub async fn check_epoch(
    client: &dyn NodeClient,
    store: &dyn IndexStore,
    height: u64,
) -> Result<Option<EpochTransition>, IndexerError> {
    let info = client.epoch_info().await?;
    let latest = store.latest_epoch().await?;
    if latest.as_ref().is_some_and(|e| e.epoch_number >= info.current_epoch) {
        return Ok(None);
    }
    let active_validators = client.active_validators().await?.len() as u32;
    let transition = EpochTransition {
        epoch_number: info.current_epoch,
        start_block: info.start_block,
        end_block: info.end_block(),
        epoch_length: info.epoch_length,
        active_validators,
        detected_at_height: height,
        recorded_at: Utc::now(),
    };
    store.insert_epoch_transition(&transition).await?;
    tracing::info!(
        epoch = transition.epoch_number,
        previous = latest.map(|e| e.epoch_number),
        start_block = transition.start_block,
        end_block = transition.end_block,
        active_validators,
        "Epoch transition recorded"
    );
    Ok(Some(transition))
}

// ─── Network stats ────────────────────────────────────────────────────────────

pub async fn snapshot_network_stats(
    client: &dyn NodeClient,
    store: &dyn IndexStore,
    height: u64,
) -> Result<NetworkStats, IndexerError> {
    let status = client.consensus_status().await?;
    let bonds = client.bonds().await?;
    let total_validators = if status.total_validators == 0 {
        bonds.len() as u32
    } else {
        status.total_validators
    };
    let stats = NetworkStats {
        block_height: height,
        recorded_at: Utc::now(),
        total_validators,
        active_validators: status.active_validators,
        quarantined_validators: status.quarantined_validators,
        total_bonded_dust: bonds.iter().map(|b| b.stake).fold(0i64, i64::saturating_add),
        last_finalized_height: status.last_finalized_height,
        fault_tolerance: status.fault_tolerance,
    };
    store.insert_network_stats(&stats).await?;
    tracing::debug!(height, total_validators, total_bonded = stats.total_bonded_dust, "network stats recorded");
    Ok(stats)
}

// ─── Main chain ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MainChainReport {
    /// Heights present both in the store and in the node's main chain.
    pub compared: u64,
    pub mismatches: u64,
}

/// Compare stored hashes for the trailing `window` blocks up to `height`
/// against the node's main chain.
///
/// Mismatches are logged and counted. Nothing is rewritten: the indexer only
/// stores finalized blocks, so a mismatch needs an operator.
pub async fn verify_main_chain(
    client: &dyn NodeClient,
    store: &dyn IndexStore,
    height: u64,
    window: u64,
) -> Result<MainChainReport, IndexerError> {
    if window == 0 {
        return Ok(MainChainReport::default());
    }
    let depth = u32::try_from(window).unwrap_or(u32::MAX);
    let entries = client.main_chain(depth).await?;
    let from = height.saturating_sub(window - 1);
    let stored: BTreeMap<u64, String> = store.block_hashes(from, height).await?.into_iter().collect();

    let mut report = MainChainReport::default();
    for entry in &entries {
        let Some(hash) = stored.get(&entry.height) else {
            continue;
        };
        report.compared += 1;
        if *hash != entry.hash {
            report.mismatches += 1;
            tracing::error!(
                height = entry.height,
                stored = %hash,
                node = %entry.hash,
                "Stored block is not on the node's main chain"
            );
        }
    }
    if report.mismatches > 0 {
        metrics::record_main_chain_mismatches(report.mismatches);
    }
    tracing::info!(height, window, compared = report.compared, mismatches = report.mismatches, "Main-chain check finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ReconcileConfig {
        ReconcileConfig {
            validators_every: 10,
            epoch_every: 50,
            stats_every: 100,
            main_chain_every: 100,
            main_chain_window: 20,
        }
    }

    #[test]
    fn tasks_fire_on_crossing_a_multiple() {
        assert!(due_tasks(&cfg(), Some(0), 9).is_empty());
        assert_eq!(due_tasks(&cfg(), Some(5), 10), vec![ReconcileTask::Validators]);
        assert_eq!(due_tasks(&cfg(), Some(9), 12), vec![ReconcileTask::Validators]);
        assert!(due_tasks(&cfg(), Some(10), 19).is_empty(), "already fired at 10");
        assert_eq!(
            due_tasks(&cfg(), Some(95), 105),
            vec![
                ReconcileTask::Validators,
                ReconcileTask::Epoch,
                ReconcileTask::NetworkStats,
                ReconcileTask::MainChain
            ]
        );
    }

    #[test]
    fn genesis_alone_triggers_nothing() {
        assert!(due_tasks(&cfg(), None, 0).is_empty());
        assert_eq!(due_tasks(&cfg(), None, 10), vec![ReconcileTask::Validators]);
    }

    #[test]
    fn large_batch_fires_once() {
        let due = due_tasks(&cfg(), Some(0), 35);
        assert_eq!(due.iter().filter(|t| **t == ReconcileTask::Validators).count(), 1);
    }
}
