//! Metric names and recording helpers.
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the embedding binary.

use metrics::{counter, gauge};

use crate::error::ErrorCategory;

pub const BLOCKS_PROCESSED: &str = "deployscan_blocks_processed_total";
pub const ERRORS: &str = "deployscan_errors_total";
pub const NODE_COMMANDS: &str = "deployscan_node_commands_total";
pub const DEPLOYS_SKIPPED: &str = "deployscan_deploys_skipped_total";
pub const REORGS_DETECTED: &str = "deployscan_reorgs_detected_total";
pub const MAIN_CHAIN_MISMATCHES: &str = "deployscan_main_chain_mismatches_total";
pub const CURRENT_HEIGHT: &str = "deployscan_current_height";
pub const BLOCKS_BEHIND: &str = "deployscan_blocks_behind_tip";

pub fn record_blocks_processed(count: u64) {
    counter!(BLOCKS_PROCESSED).increment(count);
}

pub fn record_error(category: ErrorCategory) {
    counter!(ERRORS, "category" => category.as_str()).increment(1);
}

pub fn record_command(command: &'static str, outcome: &'static str) {
    counter!(NODE_COMMANDS, "command" => command, "outcome" => outcome).increment(1);
}

pub fn record_deploys_skipped(count: u64) {
    counter!(DEPLOYS_SKIPPED).increment(count);
}

pub fn record_reorg() {
    counter!(REORGS_DETECTED).increment(1);
}

pub fn record_main_chain_mismatches(count: u64) {
    counter!(MAIN_CHAIN_MISMATCHES).increment(count);
}

pub fn set_current_height(height: u64) {
    gauge!(CURRENT_HEIGHT).set(height as f64);
}

pub fn set_blocks_behind(lag: u64) {
    gauge!(BLOCKS_BEHIND).set(lag as f64);
}
