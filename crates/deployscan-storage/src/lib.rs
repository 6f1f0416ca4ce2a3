//! deployscan-storage: persistence for the deployscan indexer.
//!
//! Backends:
//! - [`memory`]: in-memory (tests, dry runs, no persistence)
//! - `postgres`: PostgreSQL via `sqlx` (feature `postgres`)
//!
//! Every backend implements [`IndexStore`]. The central operation is
//! [`IndexStore::commit_block`]: all rows derived from one block and the
//! advanced cursor land in a single transaction, so a crash leaves either the
//! whole block or none of it.

use std::sync::Arc;

use async_trait::async_trait;

use deployscan_core::config::StorageConfig;
use deployscan_core::cursor::SyncCursor;
use deployscan_core::error::IndexerError;
use deployscan_core::types::{BalanceState, BlockCommit, EpochTransition, NetworkStats, Validator, ValidatorBond};

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// Version of the table layout, recorded in the state table by `init`.
pub const SCHEMA_VERSION: &str = "2";

/// State-table key holding [`SCHEMA_VERSION`].
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Durable storage for indexed chain data.
///
/// Writes are idempotent: committing the same block twice leaves the same
/// state as committing it once.
#[async_trait]
pub trait IndexStore: Send + Sync + 'static {
    /// Create tables if needed and record the schema version.
    async fn init(&self) -> Result<(), IndexerError>;

    async fn load_cursor(&self) -> Result<SyncCursor, IndexerError>;

    /// Overwrite the cursor outside of a block commit. Operator resets only;
    /// the sync loop advances the cursor through [`IndexStore::commit_block`].
    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<(), IndexerError>;

    async fn block_hash(&self, height: u64) -> Result<Option<String>, IndexerError>;

    /// Stored `(height, hash)` pairs for `from..=to`, ascending.
    async fn block_hashes(&self, from: u64, to: u64) -> Result<Vec<(u64, String)>, IndexerError>;

    /// Atomically write every row of `commit` and move the cursor to `cursor`.
    ///
    /// Fails with `InvariantViolation` if `cursor` is behind the stored one,
    /// or if the block's hash is already stored at another height.
    async fn commit_block(&self, commit: &BlockCommit, cursor: &SyncCursor) -> Result<(), IndexerError>;

    /// Latest balance snapshot of `address` strictly before `height`.
    async fn balance_before(&self, address: &str, height: u64) -> Result<Option<BalanceState>, IndexerError>;

    /// Bond rows of the latest stored block below `height` that carried any.
    async fn bonds_before(&self, height: u64) -> Result<Vec<ValidatorBond>, IndexerError>;

    async fn validators(&self) -> Result<Vec<Validator>, IndexerError>;

    /// Insert or update validator rows keyed by public key. `first_seen_block`
    /// only ever decreases and `last_seen_block` only ever increases.
    async fn upsert_validators(&self, validators: &[Validator]) -> Result<(), IndexerError>;

    async fn insert_network_stats(&self, stats: &NetworkStats) -> Result<(), IndexerError>;

    async fn latest_epoch(&self) -> Result<Option<EpochTransition>, IndexerError>;

    /// Record an epoch transition. Re-inserting a known epoch is a no-op.
    async fn insert_epoch_transition(&self, transition: &EpochTransition) -> Result<(), IndexerError>;

    async fn get_meta(&self, key: &str) -> Result<Option<String>, IndexerError>;

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), IndexerError>;
}

/// Open the backend selected by `config` and initialise it.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn IndexStore>, IndexerError> {
    let store: Arc<dyn IndexStore> = match &config.database_url {
        None => Arc::new(MemoryStore::new()),
        #[cfg(feature = "postgres")]
        Some(url) => Arc::new(PostgresStore::connect(url, config.max_connections).await?),
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            return Err(IndexerError::Configuration(
                "database_url given but deployscan-storage was built without the `postgres` feature".into(),
            ))
        }
    };
    store.init().await?;
    Ok(store)
}
