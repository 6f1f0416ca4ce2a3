//! deployscan-node: typed queries against the blockchain node.
//!
//! The node is only reachable through its command-line tool, so the default
//! [`NodeClient`] implementation ([`CliNodeClient`]) spawns one subprocess per
//! query and parses whatever the tool prints (see [`parse`]). Wrap it in a
//! [`RetryingClient`] to retry transient failures.

pub mod cli;
pub mod client;
pub mod error;
pub mod parse;
pub mod retry;

pub use cli::CliNodeClient;
pub use client::NodeClient;
pub use error::NodeError;
pub use retry::RetryingClient;
