//! Fluent builder API for creating sync engines.
//!
//! # Example
//!
//! ```rust,no_run
//! use deployscan_sync::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .chain("rchain-testnet")
//!     .batch_size(25)
//!     .fetch_concurrency(8)
//!     .node_program("/opt/rnode/bin/rnode")
//!     .node_args(["--grpc-host", "node0.testnet", "--grpc-port", "40401"])
//!     .build_config();
//! ```

use std::sync::Arc;

use deployscan_core::config::{AddressRules, IndexerConfig, ReconcileConfig, StorageConfig};
use deployscan_core::error::IndexerError;
use deployscan_core::retry::RetryConfig;
use deployscan_node::NodeClient;
use deployscan_storage::IndexStore;

use crate::engine::SyncEngine;

/// Fluent builder for `IndexerConfig` and [`SyncEngine`].
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: IndexerConfig) -> Self {
        Self { config }
    }

    /// Set the chain label used in logs.
    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    /// Set the maximum number of blocks per cycle.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the caught-up polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the first and maximum backoff after a failed cycle.
    pub fn error_backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.config.error_backoff_ms = initial;
        self.config.max_error_backoff_ms = max;
        self
    }

    /// Set the number of concurrent block-detail requests.
    pub fn fetch_concurrency(mut self, n: usize) -> Self {
        self.config.fetch_concurrency = n;
        self
    }

    pub fn commit_timeout_ms(mut self, ms: u64) -> Self {
        self.config.commit_timeout_ms = ms;
        self
    }

    /// Set how many blocks after genesis are scanned for full validator keys.
    pub fn genesis_key_scan_depth(mut self, depth: u64) -> Self {
        self.config.genesis_key_scan_depth = depth;
        self
    }

    /// Stop once this height is committed (bounded backfill).
    pub fn stop_at(mut self, height: u64) -> Self {
        self.config.stop_at = Some(height);
        self
    }

    /// Set the node CLI executable.
    pub fn node_program(mut self, program: impl Into<String>) -> Self {
        self.config.node.program = program.into();
        self
    }

    /// Replace the arguments passed before every node command.
    pub fn node_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.node.global_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-command node timeout in milliseconds.
    pub fn node_timeout_ms(mut self, ms: u64) -> Self {
        self.config.node.timeout_ms = ms;
        self
    }

    pub fn node_retry(mut self, retry: RetryConfig) -> Self {
        self.config.node.retry = retry;
        self
    }

    pub fn reconcile(mut self, reconcile: ReconcileConfig) -> Self {
        self.config.reconcile = reconcile;
        self
    }

    pub fn address_rules(mut self, rules: AddressRules) -> Self {
        self.config.addresses = rules;
        self
    }

    /// Use Postgres at `url` instead of the in-memory store.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.storage = StorageConfig::postgres(url);
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the configuration and build an engine over `client` and `store`.
    pub fn build(self, client: Arc<dyn NodeClient>, store: Arc<dyn IndexStore>) -> Result<SyncEngine, IndexerError> {
        SyncEngine::new(self.config, client, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = IndexerBuilder::new().build_config();
        assert_eq!(cfg.chain, "rchain");
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.stop_at, None);
        assert!(cfg.storage.database_url.is_none());
    }

    #[test]
    fn builder_custom() {
        let cfg = IndexerBuilder::new()
            .chain("rchain-testnet")
            .batch_size(5)
            .fetch_concurrency(2)
            .stop_at(1_000)
            .node_program("rnode")
            .node_args(["--grpc-port", "40411"])
            .database_url("postgres://localhost/deployscan")
            .build_config();

        assert_eq!(cfg.chain, "rchain-testnet");
        assert_eq!(cfg.batch_size, 5);
        assert_eq!(cfg.fetch_concurrency, 2);
        assert_eq!(cfg.stop_at, Some(1_000));
        assert_eq!(cfg.node.program, "rnode");
        assert_eq!(cfg.node.global_args, vec!["--grpc-port", "40411"]);
        assert_eq!(cfg.storage.database_url.as_deref(), Some("postgres://localhost/deployscan"));
    }

    #[test]
    fn invalid_config_rejected_at_build() {
        let cfg = IndexerBuilder::new().batch_size(0).build_config();
        assert!(matches!(cfg.validate(), Err(IndexerError::Configuration(_))));
    }
}
