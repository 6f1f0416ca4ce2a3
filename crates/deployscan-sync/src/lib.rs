//! deployscan-sync: the block synchronization engine.
//!
//! Ties the node client, the extractor and the index store together:
//!
//! - [`engine`]: the state machine (`run_once` / `run`)
//! - [`state`]: `SyncState` and the pure phase functions
//! - [`fetch`]: two-phase, bounded-parallel block fetch
//! - [`bootstrap`]: one-time genesis processing
//! - [`balances`]: balance snapshots derived at commit time
//! - [`reconcile`]: validator, epoch, stats and main-chain tasks
//! - [`builder`]: fluent configuration

pub mod balances;
pub mod bootstrap;
pub mod builder;
pub mod engine;
pub mod fetch;
pub mod reconcile;
pub mod state;

pub use builder::IndexerBuilder;
pub use engine::{CycleOutcome, SyncEngine};
pub use reconcile::{ReconcileTask, Reconciler};
pub use state::{plan_batch, BatchPlan, SyncState};
