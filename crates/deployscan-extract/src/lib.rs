//! deployscan-extract: turns raw node records into rows.
//!
//! Everything here is a pure function of its input: no I/O, deterministic
//! for identical bytes. Pattern rules are data tables evaluated in a fixed
//! order so that adding or reordering a rule does not touch control flow.

pub mod address;
pub mod block;
pub mod classify;
pub mod genesis;
pub mod transfers;

pub use address::AddressValidator;
pub use block::{Extracted, Extractor, SkippedDeploy};
pub use classify::{classify, CLASSIFICATION_RULES};
pub use deployscan_core::types::normalize_error_message;
pub use genesis::{collect_genesis_keys, GENESIS_SOURCE};
pub use transfers::{TransferExtractor, TransferPattern};
