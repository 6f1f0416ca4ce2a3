//! Node client backed by the node's command-line tool.
//!
//! Every query is one subprocess: `<program> <global args> <command> <args>`.
//! The child runs under a timeout with `kill_on_drop`, so a hung node is
//! killed and reaped instead of leaking a process.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use deployscan_core::config::NodeConfig;
use deployscan_core::raw::{BlockSummary, ConsensusStatus, EpochInfo, MainChainEntry, RawBlock, RawBond, RawDeploy};

use crate::client::NodeClient;
use crate::error::NodeError;
use crate::parse;

pub const LAST_FINALIZED_BLOCK: &str = "last-finalized-block";
pub const BLOCKS_BY_HEIGHT: &str = "get-blocks-by-height";
pub const BLOCK: &str = "get-block";
pub const DEPLOY: &str = "get-deploy";
pub const BONDS: &str = "bonds";
pub const ACTIVE_VALIDATORS: &str = "active-validators";
pub const EPOCH_INFO: &str = "epoch-info";
pub const CONSENSUS: &str = "network-consensus";
pub const MAIN_CHAIN: &str = "show-main-chain";

const SHELL_CANNOT_EXECUTE: i32 = 126;
const SHELL_COMMAND_NOT_FOUND: i32 = 127;

/// Runs the configured node CLI for every query.
#[derive(Debug, Clone)]
pub struct CliNodeClient {
    config: NodeConfig,
}

impl CliNodeClient {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Run one command and return its stdout.
    async fn run(&self, command: &str, args: &[String]) -> Result<String, NodeError> {
        let started = Instant::now();
        let child = Command::new(&self.config.program)
            .args(&self.config.global_args)
            .arg(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => NodeError::Spawn {
                    program: self.config.program.clone(),
                    reason: e.to_string(),
                },
                _ => NodeError::Unavailable(format!("{command}: spawn failed: {e}")),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout(), child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| NodeError::Unavailable(format!("{command}: {e}")))?,
            Err(_) => {
                tracing::warn!(command, timeout_ms = self.config.timeout_ms, "node command timed out");
                return Err(NodeError::Timeout {
                    command: command.to_string(),
                    ms: self.config.timeout_ms,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(
            command,
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = %output.status,
            bytes = stdout.len(),
            "node command finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            // 126/127: a wrapper shell could not execute the node CLI itself.
            if matches!(output.status.code(), Some(SHELL_CANNOT_EXECUTE | SHELL_COMMAND_NOT_FOUND)) {
                return Err(NodeError::Spawn {
                    program: self.config.program.clone(),
                    reason: detail.to_string(),
                });
            }
            if parse::is_not_found(detail) {
                return Err(NodeError::NotFound(format!("{command}: {detail}")));
            }
            return Err(NodeError::Unavailable(format!(
                "{command} exited with {}: {detail}",
                output.status
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl NodeClient for CliNodeClient {
    async fn last_finalized_block(&self) -> Result<BlockSummary, NodeError> {
        let out = self.run(LAST_FINALIZED_BLOCK, &[]).await?;
        parse::parse_block_summary(LAST_FINALIZED_BLOCK, &out)
    }

    async fn blocks_by_height(&self, start: u64, end: u64) -> Result<Vec<BlockSummary>, NodeError> {
        let args = [
            "--start-block-number".to_string(),
            start.to_string(),
            "--end-block-number".to_string(),
            end.to_string(),
        ];
        let out = self.run(BLOCKS_BY_HEIGHT, &args).await?;
        parse::parse_block_summaries(BLOCKS_BY_HEIGHT, &out)
    }

    async fn block(&self, hash: &str) -> Result<RawBlock, NodeError> {
        let out = self.run(BLOCK, &["--hash".to_string(), hash.to_string()]).await?;
        parse::parse_block(BLOCK, &out)
    }

    async fn deploy(&self, deploy_id: &str) -> Result<RawDeploy, NodeError> {
        let out = self.run(DEPLOY, &["--deploy-id".to_string(), deploy_id.to_string()]).await?;
        parse::parse_deploy(DEPLOY, &out)
    }

    async fn bonds(&self) -> Result<Vec<RawBond>, NodeError> {
        let out = self.run(BONDS, &[]).await?;
        parse::parse_bonds(BONDS, &out)
    }

    async fn active_validators(&self) -> Result<Vec<String>, NodeError> {
        let out = self.run(ACTIVE_VALIDATORS, &[]).await?;
        parse::parse_active_validators(ACTIVE_VALIDATORS, &out)
    }

    async fn epoch_info(&self) -> Result<EpochInfo, NodeError> {
        let out = self.run(EPOCH_INFO, &[]).await?;
        parse::parse_epoch_info(EPOCH_INFO, &out)
    }

    async fn consensus_status(&self) -> Result<ConsensusStatus, NodeError> {
        let out = self.run(CONSENSUS, &[]).await?;
        parse::parse_consensus_status(CONSENSUS, &out)
    }

    async fn main_chain(&self, depth: u32) -> Result<Vec<MainChainEntry>, NodeError> {
        let out = self.run(MAIN_CHAIN, &["--depth".to_string(), depth.to_string()]).await?;
        parse::parse_main_chain(MAIN_CHAIN, &out)
    }

    fn name(&self) -> &str {
        &self.config.program
    }
}
