//! Retry decorator for any [`NodeClient`].

use std::future::Future;

use async_trait::async_trait;

use deployscan_core::metrics;
use deployscan_core::raw::{BlockSummary, ConsensusStatus, EpochInfo, MainChainEntry, RawBlock, RawBond, RawDeploy};
use deployscan_core::retry::{Backoff, RetryConfig, RetryPolicy};

use crate::client::NodeClient;
use crate::error::NodeError;

/// Wraps a client and retries transient failures with exponential backoff.
///
/// Only [`NodeError::is_retryable`] errors are retried; malformed output and
/// missing records are returned on the first failure. Every attempt is
/// counted in the node command metric.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: NodeClient> RetryingClient<C> {
    pub fn new(inner: C, config: RetryConfig) -> Self {
        Self {
            inner,
            policy: RetryPolicy::new(config),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, NodeError>> + Send,
        T: Send,
    {
        let mut failures = 0u32;
        loop {
            let err = match call().await {
                Ok(value) => {
                    metrics::record_command(op, "ok");
                    return Ok(value);
                }
                Err(e) => e,
            };
            metrics::record_command(op, err.outcome());
            if !err.is_retryable() {
                return Err(err);
            }
            failures += 1;
            match self.policy.after_failure(failures) {
                Backoff::Wait(delay) => {
                    tracing::warn!(
                        op,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        node = self.inner.name(),
                        "retrying node command"
                    );
                    tokio::time::sleep(delay).await;
                }
                Backoff::GiveUp => {
                    tracing::error!(op, failures, error = %err, node = self.inner.name(), "node command failed, attempts exhausted");
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl<C: NodeClient> NodeClient for RetryingClient<C> {
    async fn last_finalized_block(&self) -> Result<BlockSummary, NodeError> {
        self.with_retry("last_finalized_block", || self.inner.last_finalized_block()).await
    }

    async fn blocks_by_height(&self, start: u64, end: u64) -> Result<Vec<BlockSummary>, NodeError> {
        self.with_retry("blocks_by_height", || self.inner.blocks_by_height(start, end)).await
    }

    async fn block(&self, hash: &str) -> Result<RawBlock, NodeError> {
        self.with_retry("block", || self.inner.block(hash)).await
    }

    async fn deploy(&self, deploy_id: &str) -> Result<RawDeploy, NodeError> {
        self.with_retry("deploy", || self.inner.deploy(deploy_id)).await
    }

    async fn bonds(&self) -> Result<Vec<RawBond>, NodeError> {
        self.with_retry("bonds", || self.inner.bonds()).await
    }

    async fn active_validators(&self) -> Result<Vec<String>, NodeError> {
        self.with_retry("active_validators", || self.inner.active_validators()).await
    }

    async fn epoch_info(&self) -> Result<EpochInfo, NodeError> {
        self.with_retry("epoch_info", || self.inner.epoch_info()).await
    }

    async fn consensus_status(&self) -> Result<ConsensusStatus, NodeError> {
        self.with_retry("consensus_status", || self.inner.consensus_status()).await
    }

    async fn main_chain(&self, depth: u32) -> Result<Vec<MainChainEntry>, NodeError> {
        self.with_retry("main_chain", || self.inner.main_chain(depth)).await
    }

    async fn ping(&self) -> Result<(), NodeError> {
        let result = self.inner.ping().await;
        metrics::record_command("ping", result.as_ref().map_or_else(NodeError::outcome, |_| "ok"));
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
