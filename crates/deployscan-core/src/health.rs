//! Liveness / readiness state shared between the sync loop and whoever
//! exposes it (CLI status output, an external health endpoint).

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, IndexerError};

/// Phase of the sync state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    /// Genesis processing (runs once, while the cursor is unset).
    Bootstrapping,
    Polling,
    Fetching,
    Extracting,
    Committing,
    /// A cycle failed; the loop backs off and returns to `Idle`.
    Error,
    Stopped,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::Polling => write!(f, "polling"),
            Self::Fetching => write!(f, "fetching"),
            Self::Extracting => write!(f, "extracting"),
            Self::Committing => write!(f, "committing"),
            Self::Error => write!(f, "error"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub phase: SyncPhase,
    pub cursor: Option<u64>,
    pub chain_tip: Option<u64>,
    pub blocks_behind: Option<u64>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_category: Option<ErrorCategory>,
    pub last_error: Option<String>,
    pub node_reachable: bool,
}

impl HealthSnapshot {
    /// The loop completed a cycle recently enough.
    pub fn is_live(&self, max_stall: Duration, now: DateTime<Utc>) -> bool {
        match self.last_success_at {
            Some(at) => chrono::Duration::from_std(max_stall)
                .map(|stall| now - at <= stall)
                .unwrap_or(true),
            None => self.phase == SyncPhase::Bootstrapping,
        }
    }

    /// Node reachable, genesis done, and not sitting in the error state.
    pub fn is_ready(&self) -> bool {
        self.node_reachable && self.cursor.is_some() && self.phase != SyncPhase::Error
    }
}

#[derive(Debug)]
struct Inner {
    phase: SyncPhase,
    cursor: Option<u64>,
    chain_tip: Option<u64>,
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<(ErrorCategory, String)>,
    node_reachable: bool,
}

/// Thread-safe health recorder. Wrap in an `Arc` and share.
#[derive(Debug)]
pub struct HealthMonitor {
    inner: RwLock<Inner>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                phase: SyncPhase::Idle,
                cursor: None,
                chain_tip: None,
                last_success_at: None,
                last_error: None,
                node_reachable: false,
            }),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_phase(&self, phase: SyncPhase) {
        self.write().phase = phase;
    }

    pub fn set_cursor(&self, cursor: Option<u64>) {
        self.write().cursor = cursor;
        if let Some(h) = cursor {
            crate::metrics::set_current_height(h);
        }
        self.publish_lag();
    }

    pub fn set_chain_tip(&self, tip: u64) {
        self.write().chain_tip = Some(tip);
        self.publish_lag();
    }

    pub fn set_node_reachable(&self, reachable: bool) {
        self.write().node_reachable = reachable;
    }

    pub fn record_success(&self) {
        let mut inner = self.write();
        inner.last_success_at = Some(Utc::now());
        inner.last_error = None;
    }

    pub fn record_error(&self, err: &IndexerError) {
        let category = err.category();
        crate::metrics::record_error(category);
        let mut inner = self.write();
        inner.phase = SyncPhase::Error;
        inner.last_error = Some((category, err.to_string()));
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        HealthSnapshot {
            phase: inner.phase,
            cursor: inner.cursor,
            chain_tip: inner.chain_tip,
            blocks_behind: blocks_behind(inner.chain_tip, inner.cursor),
            last_success_at: inner.last_success_at,
            last_error_category: inner.last_error.as_ref().map(|(c, _)| *c),
            last_error: inner.last_error.as_ref().map(|(_, m)| m.clone()),
            node_reachable: inner.node_reachable,
        }
    }

    fn publish_lag(&self) {
        let snap = self.snapshot();
        if let Some(lag) = snap.blocks_behind {
            crate::metrics::set_blocks_behind(lag);
        }
    }
}

pub fn blocks_behind(tip: Option<u64>, cursor: Option<u64>) -> Option<u64> {
    match (tip, cursor) {
        (Some(tip), Some(cursor)) => Some(tip.saturating_sub(cursor)),
        (Some(tip), None) => Some(tip + 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_behind_handles_missing_values() {
        assert_eq!(blocks_behind(None, Some(1)), None);
        assert_eq!(blocks_behind(Some(10), Some(7)), Some(3));
        assert_eq!(blocks_behind(Some(7), Some(10)), Some(0));
        assert_eq!(blocks_behind(Some(4), None), Some(5));
    }

    #[test]
    fn error_then_success_clears_error() {
        let health = HealthMonitor::new();
        health.set_node_reachable(true);
        health.set_cursor(Some(3));
        health.record_error(&IndexerError::TransientIo("refused".into()));
        let snap = health.snapshot();
        assert_eq!(snap.phase, SyncPhase::Error);
        assert_eq!(snap.last_error_category, Some(ErrorCategory::TransientIo));
        assert!(!snap.is_ready());

        health.set_phase(SyncPhase::Idle);
        health.record_success();
        let snap = health.snapshot();
        assert!(snap.is_ready());
        assert!(snap.last_error.is_none());
        assert!(snap.is_live(Duration::from_secs(60), Utc::now()));
    }

    #[test]
    fn not_ready_before_genesis() {
        let health = HealthMonitor::new();
        health.set_node_reachable(true);
        assert!(!health.snapshot().is_ready());
    }
}
