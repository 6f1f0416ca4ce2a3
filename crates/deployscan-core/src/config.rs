//! Indexer configuration.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::retry::RetryConfig;

/// How the external node-query program is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Path or name of the CLI executable.
    pub program: String,
    /// Arguments prepended to every command (host, port, ...).
    pub global_args: Vec<String>,
    /// Per-invocation timeout in milliseconds.
    pub timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            program: "rnode-cli".into(),
            global_args: vec!["--host".into(), "localhost".into(), "--port".into(), "40402".into()],
            timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

/// Block-height moduli for the background reconciliation tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub validators_every: u64,
    pub epoch_every: u64,
    pub stats_every: u64,
    pub main_chain_every: u64,
    /// Trailing window (in blocks) compared by the main-chain check.
    pub main_chain_window: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            validators_every: 10,
            epoch_every: 50,
            stats_every: 100,
            main_chain_every: 100,
            main_chain_window: 50,
        }
    }
}

/// Accepted address shapes.
///
/// The length windows have changed between node releases; they are tunables
/// and should be checked against real chain data when upgrading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRules {
    /// Prefix every token (REV) address starts with.
    pub rev_prefix: String,
    pub rev_min_len: usize,
    pub rev_max_len: usize,
    /// Hex-encoded public key length window (characters).
    pub pubkey_min_len: usize,
    pub pubkey_max_len: usize,
    /// Minimum prefix length an abbreviated validator key must keep to be
    /// matched against a full key.
    pub min_key_fragment: usize,
}

impl Default for AddressRules {
    fn default() -> Self {
        Self {
            rev_prefix: "1111".into(),
            rev_min_len: 53,
            rev_max_len: 57,
            pubkey_min_len: 66,
            pubkey_max_len: 130,
            min_key_fragment: 6,
        }
    }
}

/// Backend selection for the index store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Postgres connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Pool size for the Postgres backend.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
        }
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            database_url: Some(url.into()),
            max_connections: default_max_connections(),
        }
    }
}

/// Configuration for an indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Chain label used in logs and the state table.
    pub chain: String,
    /// Maximum number of blocks fetched and committed per cycle.
    pub batch_size: u64,
    /// Sleep between polls once the cursor has caught up (milliseconds).
    pub poll_interval_ms: u64,
    /// First backoff after a failed cycle; doubles up to `max_error_backoff_ms`.
    pub error_backoff_ms: u64,
    pub max_error_backoff_ms: u64,
    /// Maximum concurrent block-detail requests during a fetch.
    pub fetch_concurrency: usize,
    /// Per-block database transaction timeout (milliseconds).
    pub commit_timeout_ms: u64,
    /// How many early blocks to scan for full validator keys at genesis.
    pub genesis_key_scan_depth: u64,
    /// Stop once this height is committed (bounded backfill). `None` = run forever.
    pub stop_at: Option<u64>,
    pub node: NodeConfig,
    pub reconcile: ReconcileConfig,
    pub addresses: AddressRules,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chain: "rchain".into(),
            batch_size: 50,
            poll_interval_ms: 5_000,
            error_backoff_ms: 2_000,
            max_error_backoff_ms: 60_000,
            fetch_concurrency: 4,
            commit_timeout_ms: 30_000,
            genesis_key_scan_depth: 20,
            stop_at: None,
            node: NodeConfig::default(),
            reconcile: ReconcileConfig::default(),
            addresses: AddressRules::default(),
            storage: StorageConfig::memory(),
        }
    }
}

impl IndexerConfig {
    /// Reject configurations the sync loop cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        let fail = |msg: &str| Err(IndexerError::Configuration(msg.to_string()));
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1");
        }
        if self.fetch_concurrency == 0 {
            return fail("fetch_concurrency must be at least 1");
        }
        if self.node.program.trim().is_empty() {
            return fail("node program must not be empty");
        }
        if self.node.timeout_ms == 0 || self.commit_timeout_ms == 0 {
            return fail("timeouts must be non-zero");
        }
        if self.node.retry.max_attempts == 0 {
            return fail("node.retry.max_attempts must be at least 1");
        }
        let r = &self.reconcile;
        if r.validators_every == 0 || r.epoch_every == 0 || r.stats_every == 0 || r.main_chain_every == 0 {
            return fail("reconciliation moduli must be non-zero");
        }
        let a = &self.addresses;
        if a.rev_min_len > a.rev_max_len || a.pubkey_min_len > a.pubkey_max_len {
            return fail("address length windows are inverted");
        }
        if a.rev_prefix.is_empty() || a.rev_prefix.len() >= a.rev_min_len {
            return fail("rev_prefix must be non-empty and shorter than rev_min_len");
        }
        if self.storage.database_url.is_some() && self.storage.max_connections == 0 {
            return fail("storage.max_connections must be at least 1");
        }
        Ok(())
    }
}
