//! deployscan CLI: run the block indexer and manage its sync cursor.
//!
//! # Commands
//! ```text
//! deployscan run     [--batch-size N] [--stop-at H]   sync until Ctrl-C (or H)
//! deployscan status  [--json]                         cursor, stored tip, schema
//! deployscan reset   --height N | --genesis           operator re-sync
//! deployscan info                                     effective configuration
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use deployscan_core::config::{IndexerConfig, StorageConfig};
use deployscan_core::cursor::SyncCursor;
use deployscan_node::{CliNodeClient, NodeClient, RetryingClient};
use deployscan_storage::{IndexStore, SCHEMA_VERSION_KEY};
use deployscan_sync::IndexerBuilder;

mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "deployscan",
    about = "Block indexer for RChain-style networks",
    long_about = "
deployscan follows the last finalized block of a node, extracts deployments,
transfers, validator bonds and balances, and writes them to PostgreSQL.

ENVIRONMENT VARIABLES (a .env file in the working directory is honoured):
  DEPLOYSCAN_DATABASE_URL    PostgreSQL connection string
  DEPLOYSCAN_NODE_PROGRAM    node CLI executable
  DEPLOYSCAN_NODE_ARGS       comma-separated arguments passed before every command
  DEPLOYSCAN_LOG             log level or directives (default: info)
",
    version
)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, global = true, env = "DEPLOYSCAN_DATABASE_URL")]
    database_url: Option<String>,

    /// Use the in-memory store (nothing is persisted)
    #[arg(long, global = true)]
    memory: bool,

    /// Node CLI executable
    #[arg(long, global = true, env = "DEPLOYSCAN_NODE_PROGRAM")]
    node_program: Option<String>,

    /// Arguments passed to the node CLI before every command
    #[arg(
        long = "node-arg",
        global = true,
        env = "DEPLOYSCAN_NODE_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true
    )]
    node_args: Vec<String>,

    /// Per-command node timeout in milliseconds
    #[arg(long, global = true, env = "DEPLOYSCAN_NODE_TIMEOUT_MS")]
    node_timeout_ms: Option<u64>,

    /// Log level, optionally followed by per-crate overrides
    /// (e.g. `info` or `info,deployscan-node=debug`)
    #[arg(long, global = true, env = "DEPLOYSCAN_LOG", default_value = "info")]
    log: String,

    /// Emit JSON logs
    #[arg(long, global = true, env = "DEPLOYSCAN_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Maximum blocks per cycle
    #[arg(long, env = "DEPLOYSCAN_BATCH_SIZE")]
    batch_size: Option<u64>,

    /// Sleep between polls once caught up (milliseconds)
    #[arg(long, env = "DEPLOYSCAN_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Concurrent block-detail requests
    #[arg(long, env = "DEPLOYSCAN_FETCH_CONCURRENCY")]
    fetch_concurrency: Option<usize>,

    /// Stop after committing this height
    #[arg(long)]
    stop_at: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync continuously until interrupted
    Run(RunArgs),

    /// Show the sync cursor and stored chain tip
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move the sync cursor (re-sync after a reorg)
    Reset {
        /// Resume syncing after this height
        #[arg(long, conflicts_with = "genesis", required_unless_present = "genesis")]
        height: Option<u64>,
        /// Clear the cursor so genesis is bootstrapped again
        #[arg(long)]
        genesis: bool,
    },

    /// Print the effective configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut levels = cli.log.split(',');
    let log = LogConfig {
        level: levels.next().unwrap_or("info").to_string(),
        json: cli.log_json,
        ..Default::default()
    }
    .with_components(levels);
    init_tracing(&log);

    match &cli.command {
        Commands::Run(args) => cmd_run(&cli, args).await,
        Commands::Status { json } => cmd_status(&cli, *json).await,
        Commands::Reset { height, genesis } => cmd_reset(&cli, *height, *genesis).await,
        Commands::Info => cmd_info(&cli),
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

fn build_config(cli: &Cli, run: &RunArgs) -> Result<IndexerConfig> {
    let mut builder = IndexerBuilder::new();
    if let Some(program) = &cli.node_program {
        builder = builder.node_program(program.clone());
    }
    if !cli.node_args.is_empty() {
        builder = builder.node_args(cli.node_args.iter().map(|a| a.trim().to_string()));
    }
    if let Some(ms) = cli.node_timeout_ms {
        builder = builder.node_timeout_ms(ms);
    }
    if let Some(n) = run.batch_size {
        builder = builder.batch_size(n);
    }
    if let Some(ms) = run.poll_interval_ms {
        builder = builder.poll_interval_ms(ms);
    }
    if let Some(n) = run.fetch_concurrency {
        builder = builder.fetch_concurrency(n);
    }
    if let Some(h) = run.stop_at {
        builder = builder.stop_at(h);
    }

    let mut config = builder.build_config();
    config.storage = match (&cli.database_url, cli.memory) {
        (_, true) => StorageConfig::memory(),
        (Some(url), false) => StorageConfig::postgres(url.clone()),
        (None, false) => bail!("no database configured: pass --database-url (or DEPLOYSCAN_DATABASE_URL) or --memory"),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn open_store(config: &IndexerConfig) -> Result<Arc<dyn IndexStore>> {
    deployscan_storage::open(&config.storage)
        .await
        .context("opening index store")
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let config = build_config(cli, args)?;
    let store = open_store(&config).await?;
    let client: Arc<dyn NodeClient> = Arc::new(RetryingClient::new(
        CliNodeClient::new(config.node.clone()),
        config.node.retry.clone(),
    ));

    tracing::info!(
        chain = %config.chain,
        node = %config.node.program,
        batch_size = config.batch_size,
        persistent = config.storage.database_url.is_some(),
        "Starting deployscan"
    );

    let mut engine = IndexerBuilder::from_config(config).build(client, store)?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, finishing current phase");
            on_signal.cancel();
        }
    });

    engine.run(shutdown).await.context("sync engine stopped with an error")?;
    let snapshot = engine.health().snapshot();
    tracing::info!(cursor = ?snapshot.cursor, tip = ?snapshot.chain_tip, "deployscan exited cleanly");
    Ok(())
}

async fn cmd_status(cli: &Cli, as_json: bool) -> Result<()> {
    let config = build_config(cli, &RunArgs::default())?;
    let store = open_store(&config).await?;

    let cursor = store.load_cursor().await?;
    let tip_hash = match cursor.height() {
        Some(h) => store.block_hash(h).await?,
        None => None,
    };
    let schema = store.get_meta(SCHEMA_VERSION_KEY).await?;
    let epoch = store.latest_epoch().await?;
    let validators = store.validators().await?.len();

    if as_json {
        let out = serde_json::json!({
            "cursor": cursor.height(),
            "tip_hash": tip_hash,
            "schema_version": schema,
            "latest_epoch": epoch.map(|e| e.epoch_number),
            "validators": validators,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match cursor.height() {
        Some(h) => println!("Cursor:          {h}"),
        None => println!("Cursor:          (unset, genesis not yet indexed)"),
    }
    println!("Stored tip hash: {}", tip_hash.as_deref().unwrap_or("-"));
    println!("Schema version:  {}", schema.as_deref().unwrap_or("-"));
    println!(
        "Latest epoch:    {}",
        epoch.map_or_else(|| "-".to_string(), |e| e.epoch_number.to_string())
    );
    println!("Validators:      {validators}");
    Ok(())
}

async fn cmd_reset(cli: &Cli, height: Option<u64>, genesis: bool) -> Result<()> {
    let config = build_config(cli, &RunArgs::default())?;
    if config.storage.database_url.is_none() {
        bail!("reset needs a persistent store; --memory has no cursor to move");
    }
    let store = open_store(&config).await?;

    let before = store.load_cursor().await?;
    let target = if genesis { None } else { height };
    if let Some(h) = target {
        if store.block_hash(h).await?.is_none() {
            bail!("block {h} is not stored; pick a height at or below {:?}", before.height());
        }
    }
    let mut cursor = SyncCursor::unset();
    cursor.reset_to(target);
    store.save_cursor(&cursor).await?;

    tracing::warn!(from = ?before.height(), to = ?target, "Sync cursor reset by operator");
    match target {
        Some(h) => println!("Cursor moved from {:?} to {h}; blocks above {h} will be re-indexed.", before.height()),
        None => println!("Cursor cleared; genesis will be bootstrapped on the next run."),
    }
    Ok(())
}

fn cmd_info(cli: &Cli) -> Result<()> {
    let mut config = match build_config(cli, &RunArgs::default()) {
        Ok(config) => config,
        Err(_) => IndexerBuilder::new().build_config(),
    };
    if let Some(url) = config.storage.database_url.as_mut() {
        *url = redact(url);
    }
    println!("deployscan v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Hide the password of a connection string.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            let userinfo = &url[scheme + 3..at];
            match userinfo.split_once(':') {
                Some((user, _)) => format!("{}{user}:***{}", &url[..scheme + 3], &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn password_is_redacted() {
        assert_eq!(redact("postgres://idx:secret@db:5432/deployscan"), "postgres://idx:***@db:5432/deployscan");
        assert_eq!(redact("postgres://db/deployscan"), "postgres://db/deployscan");
    }

    #[test]
    fn memory_flag_selects_memory_store() {
        let cli = Cli::parse_from(["deployscan", "--memory", "run", "--batch-size", "7"]);
        let Commands::Run(args) = &cli.command else {
            panic!("expected run");
        };
        let cfg = build_config(&cli, args).unwrap();
        assert!(cfg.storage.database_url.is_none());
        assert_eq!(cfg.batch_size, 7);
    }

    #[test]
    fn node_args_split_on_commas() {
        let cli = Cli::parse_from(["deployscan", "--memory", "--node-arg=--grpc-host,node0", "info"]);
        let cfg = build_config(&cli, &RunArgs::default()).unwrap();
        assert_eq!(cfg.node.global_args, vec!["--grpc-host", "node0"]);
    }
}
