//! The sync engine: drives the state machine.
//!
//! ```text
//! Idle → Bootstrapping (genesis, once) → Polling → Fetching → Extracting
//!      → Committing → Idle
//!
//! any failure → Error → (backoff) → Idle
//! ```
//!
//! One cycle ([`SyncEngine::run_once`]) polls the finalized tip, bootstraps
//! genesis if the cursor is unset, then fetches, extracts and commits at most
//! one batch. Each block is committed in its own transaction together with
//! the advanced cursor, so a crash between blocks loses nothing and replays
//! nothing twice. Shutdown is checked between phases, never inside a commit.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use deployscan_core::config::IndexerConfig;
use deployscan_core::cursor::SyncCursor;
use deployscan_core::error::{ErrorCategory, IndexerError};
use deployscan_core::health::{HealthMonitor, SyncPhase};
use deployscan_core::metrics;
use deployscan_core::reorg::{verify_linkage, TipMonitor};
use deployscan_extract::{Extracted, Extractor};
use deployscan_node::NodeClient;
use deployscan_storage::IndexStore;

use crate::balances::derive_balances;
use crate::bootstrap::{bootstrap_genesis, commit_with_timeout, BootstrapParams};
use crate::fetch::fetch_blocks;
use crate::reconcile::Reconciler;
use crate::state::{extract_batch, plan_batch, SyncState};

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Blocks `from..=to` were committed.
    Committed { from: u64, to: u64 },
    /// Only genesis was committed (the tip is still at 0).
    Bootstrapped,
    /// Nothing new below the finalized tip.
    CaughtUp { cursor: u64, tip: u64 },
    /// `stop_at` has been reached.
    Finished { cursor: u64 },
}

pub struct SyncEngine {
    config: IndexerConfig,
    client: Arc<dyn NodeClient>,
    store: Arc<dyn IndexStore>,
    extractor: Extractor,
    reconciler: Reconciler,
    health: Arc<HealthMonitor>,
    state: SyncState,
    tips: TipMonitor,
    shutdown: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        config: IndexerConfig,
        client: Arc<dyn NodeClient>,
        store: Arc<dyn IndexStore>,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        let extractor = Extractor::new(config.addresses.clone())?;
        let min_fragment = config.addresses.min_key_fragment;
        let reconciler = Reconciler::new(
            Arc::clone(&client),
            Arc::clone(&store),
            config.reconcile.clone(),
            min_fragment,
        );
        Ok(Self {
            extractor,
            reconciler,
            health: Arc::new(HealthMonitor::new()),
            state: SyncState::new(min_fragment),
            tips: TipMonitor::new(),
            shutdown: CancellationToken::new(),
            client,
            store,
            config,
        })
    }

    /// Share an existing health monitor instead of the engine's own.
    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = health;
        self
    }

    pub fn health(&self) -> Arc<HealthMonitor> {
        Arc::clone(&self.health)
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn reconciler(&mut self) -> &mut Reconciler {
        &mut self.reconciler
    }

    /// Token observed between phases; cancel it to stop [`SyncEngine::run`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Startup checks: node reachable, stored state readable.
    ///
    /// An unreachable node at startup is a configuration problem and fails
    /// fast; once running, the same failure is a transient error.
    pub async fn preflight(&mut self) -> Result<(), IndexerError> {
        if let Err(e) = self.client.ping().await {
            self.health.set_node_reachable(false);
            return Err(IndexerError::Configuration(format!(
                "node `{}` is not reachable: {e}",
                self.client.name()
            )));
        }
        self.health.set_node_reachable(true);

        self.state.cursor = self.store.load_cursor().await?;
        for v in self.store.validators().await? {
            self.state.keys.learn(&v.public_key);
        }
        self.health.set_cursor(self.state.cursor.height());
        tracing::info!(
            chain = %self.config.chain,
            node = self.client.name(),
            cursor = ?self.state.cursor.height(),
            known_keys = self.state.keys.len(),
            "Resuming from stored cursor"
        );
        Ok(())
    }

    /// Run cycles until cancelled, `stop_at` is reached, or a configuration
    /// error occurs. Other errors back off and retry.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), IndexerError> {
        self.shutdown = shutdown;
        self.preflight().await?;

        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let base = Duration::from_millis(self.config.error_backoff_ms);
        let max = Duration::from_millis(self.config.max_error_backoff_ms);

        let result = loop {
            if self.shutdown.is_cancelled() {
                break Ok(());
            }
            let wait = match self.run_once().await {
                Ok(CycleOutcome::Committed { .. }) | Ok(CycleOutcome::Bootstrapped) => Duration::ZERO,
                Ok(CycleOutcome::CaughtUp { .. }) => poll,
                Ok(CycleOutcome::Finished { cursor }) => {
                    tracing::info!(cursor, "Reached stop height");
                    break Ok(());
                }
                Err(e) if e.category() == ErrorCategory::Shutdown => break Ok(()),
                Err(e) if e.category() == ErrorCategory::Configuration => {
                    self.health.record_error(&e);
                    break Err(e);
                }
                Err(e) => {
                    let delay = self.state.record_failure(base, max);
                    self.health.record_error(&e);
                    tracing::warn!(
                        error = %e,
                        category = %e.category(),
                        failures = self.state.consecutive_failures,
                        backoff_ms = delay.as_millis() as u64,
                        "Sync cycle failed"
                    );
                    delay
                }
            };
            if !wait.is_zero() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break Ok(()),
                    _ = tokio::time::sleep(wait) => {}
                }
                self.health.set_phase(SyncPhase::Idle);
            }
        };

        self.reconciler.drain().await;
        self.health.set_phase(SyncPhase::Stopped);
        tracing::info!(cursor = ?self.state.cursor.height(), "Sync engine stopped");
        result
    }

    /// Execute one cycle of the state machine.
    pub async fn run_once(&mut self) -> Result<CycleOutcome, IndexerError> {
        // ── Polling ──────────────────────────────────────────────────────────
        self.enter(SyncPhase::Polling)?;
        let tip = match self.client.last_finalized_block().await {
            Ok(summary) => summary.height,
            Err(e) => {
                self.health.set_node_reachable(false);
                return Err(e.into());
            }
        };
        self.health.set_node_reachable(true);
        self.health.set_chain_tip(tip);
        self.tips.observe(tip);
        self.state.tip = Some(tip);
        self.state.cursor = self.store.load_cursor().await?;
        self.health.set_cursor(self.state.cursor.height());

        // ── Bootstrapping ────────────────────────────────────────────────────
        let bootstrapped = self.state.cursor.is_unset();
        if bootstrapped {
            self.enter(SyncPhase::Bootstrapping)?;
            let keys = bootstrap_genesis(
                self.client.as_ref(),
                self.store.as_ref(),
                &self.extractor,
                BootstrapParams {
                    tip,
                    scan_depth: self.config.genesis_key_scan_depth,
                    min_key_fragment: self.config.addresses.min_key_fragment,
                    fetch_concurrency: self.config.fetch_concurrency,
                    commit_timeout: self.commit_timeout(),
                },
            )
            .await?;
            self.state.keys = keys;
            for v in self.store.validators().await? {
                self.state.keys.learn(&v.public_key);
            }
            self.state.cursor.advance(0)?;
            self.health.set_cursor(Some(0));
            metrics::record_blocks_processed(1);
        }

        let cursor = self.state.cursor.height().unwrap_or(0);
        let Some(plan) = plan_batch(&self.state, self.config.batch_size, self.config.stop_at) else {
            self.finish_cycle();
            if self.config.stop_at.is_some_and(|stop| cursor >= stop) {
                return Ok(CycleOutcome::Finished { cursor });
            }
            if bootstrapped {
                return Ok(CycleOutcome::Bootstrapped);
            }
            return Ok(CycleOutcome::CaughtUp { cursor, tip });
        };

        // ── Fetching ─────────────────────────────────────────────────────────
        self.enter(SyncPhase::Fetching)?;
        let blocks = fetch_blocks(self.client.as_ref(), plan.start, plan.end, self.config.fetch_concurrency).await?;
        let anchor = self.store.block_hash(plan.start - 1).await?;
        if let Err(e) = verify_linkage(anchor.as_deref().map(|h| (plan.start - 1, h)), &blocks) {
            if e.is_reorg() {
                metrics::record_reorg();
            }
            return Err(e);
        }

        // ── Extracting ───────────────────────────────────────────────────────
        self.enter(SyncPhase::Extracting)?;
        let extracted = extract_batch(&self.extractor, &blocks, &mut self.state.keys);

        // ── Committing ───────────────────────────────────────────────────────
        self.enter(SyncPhase::Committing)?;
        let previous = self.state.cursor.height();
        if let Err(e) = self.commit_batch(extracted).await {
            // Blocks committed before the failure still count toward reconciliation.
            if let Some(reached) = self.state.cursor.height().filter(|h| previous < Some(*h)) {
                tracing::warn!(from = plan.start, reached, to = plan.end, error = %e, "Batch partially committed");
                self.schedule_reconciliation(previous, reached);
            }
            return Err(e);
        }

        tracing::info!(
            from = plan.start,
            to = plan.end,
            tip,
            behind = tip.saturating_sub(plan.end),
            "Batch committed"
        );
        self.schedule_reconciliation(previous, plan.end);
        self.finish_cycle();
        Ok(CycleOutcome::Committed {
            from: plan.start,
            to: plan.end,
        })
    }

    /// Commit blocks in order, advancing the cursor after each one. Stops at
    /// the first failure; earlier blocks stay committed.
    async fn commit_batch(&mut self, extracted: Vec<Extracted>) -> Result<(), IndexerError> {
        let timeout = self.commit_timeout();
        for mut e in extracted {
            let height = e.commit.height();
            derive_balances(self.store.as_ref(), self.extractor.addresses(), &mut e.commit).await?;
            commit_with_timeout(self.store.as_ref(), &e.commit, SyncCursor::at(height), timeout).await?;
            self.state.cursor.advance(height)?;
            self.health.set_cursor(Some(height));
            metrics::record_blocks_processed(1);
            tracing::debug!(
                height,
                deployments = e.commit.deployments.len(),
                transfers = e.commit.transfers.len(),
                skipped = e.skipped.len(),
                "block committed"
            );
        }
        Ok(())
    }

    fn schedule_reconciliation(&mut self, previous: Option<u64>, committed: u64) {
        let started = self.reconciler.schedule(previous, committed);
        if !started.is_empty() {
            tracing::debug!(height = committed, tasks = ?started, "reconciliation scheduled");
        }
    }

    fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.config.commit_timeout_ms)
    }

    /// Move to `phase`, unless shutdown was requested in the meantime.
    fn enter(&self, phase: SyncPhase) -> Result<(), IndexerError> {
        if self.shutdown.is_cancelled() {
            return Err(IndexerError::Aborted {
                reason: format!("shutdown requested before {phase}"),
            });
        }
        self.health.set_phase(phase);
        Ok(())
    }

    fn finish_cycle(&mut self) {
        self.state.record_success();
        self.health.record_success();
        self.health.set_phase(SyncPhase::Idle);
    }
}
