//! deployscan-core: foundation for the deployscan block indexer.
//!
//! # Architecture
//!
//! ```text
//! SyncEngine (deployscan-sync)
//!     ├── NodeClient        (deployscan-node: CLI subprocess, retry decorator)
//!     ├── extract_block     (deployscan-extract: classification, transfers)
//!     ├── IndexStore        (deployscan-storage: memory / Postgres)
//!     └── Reconciler        (validators, epochs, stats, main-chain check)
//! ```
//!
//! This crate holds everything those pieces share: the row types, the raw
//! node records, the error taxonomy, the sync cursor, configuration, retry
//! policy, reorg linkage checks, validator identity resolution and the
//! health/metrics surface.

pub mod config;
pub mod cursor;
pub mod error;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod raw;
pub mod reorg;
pub mod retry;
pub mod types;

pub use config::{AddressRules, IndexerConfig, NodeConfig, ReconcileConfig, StorageConfig};
pub use cursor::SyncCursor;
pub use error::{ErrorCategory, IndexerError};
pub use health::{HealthMonitor, HealthSnapshot, SyncPhase};
pub use identity::KeyDirectory;
pub use raw::{BlockSummary, ConsensusStatus, EpochInfo, MainChainEntry, RawBlock, RawBond, RawDeploy};
pub use retry::{Backoff, RetryConfig, RetryPolicy};
pub use types::{
    BalanceState, Block, BlockCommit, Deployment, DeploymentStatus, DeploymentType,
    EpochTransition, NetworkStats, Transfer, TransferStatus, Validator, ValidatorBond,
    ValidatorSighting, ValidatorStatus, DUST_PER_REV,
};
