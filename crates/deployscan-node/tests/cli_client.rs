//! Drives `CliNodeClient` against a shell script standing in for the node CLI.
#![cfg(unix)]

use deployscan_core::config::NodeConfig;
use deployscan_node::{CliNodeClient, NodeClient, NodeError};

/// `sh -c <script> sh <command> <args...>`: the script sees the command as `$1`.
fn fake_node(script: &str, timeout_ms: u64) -> CliNodeClient {
    CliNodeClient::new(NodeConfig {
        program: "sh".into(),
        global_args: vec!["-c".into(), script.into(), "sh".into()],
        timeout_ms,
        ..NodeConfig::default()
    })
}

const SCRIPT: &str = r#"
case "$1" in
  last-finalized-block)
    echo '{"blockInfo": {"blockNumber": 7, "blockHash": "h7", "parentsHashList": ["h6"]}, "deploys": []}' ;;
  get-blocks-by-height)
    echo "[{\"blockNumber\": $3, \"blockHash\": \"h$3\"}, {\"blockNumber\": $5, \"blockHash\": \"h$5\"}]" ;;
  get-block)
    if [ "$3" = "missing" ]; then echo "Error: block not found" >&2; exit 1; fi
    echo "{\"blockInfo\": {\"blockNumber\": 1, \"blockHash\": \"$3\", \"parentsHashList\": [\"h0\"]}, \"deploys\": []}" ;;
  bonds)
    printf '04aa: 10\n04bb: 20\n' ;;
  *)
    echo "unknown command $1" >&2; exit 2 ;;
esac
"#;

#[tokio::test]
async fn runs_commands_and_parses_output() {
    let node = fake_node(SCRIPT, 5_000);
    assert_eq!(node.last_finalized_block().await.unwrap().height, 7);

    let range = node.blocks_by_height(3, 4).await.unwrap();
    assert_eq!(range.iter().map(|b| b.hash.as_str()).collect::<Vec<_>>(), vec!["h3", "h4"]);

    let block = node.block("abc").await.unwrap();
    assert_eq!(block.hash, "abc");
    assert_eq!(block.parent_hash, "h0");

    let bonds = node.bonds().await.unwrap();
    assert_eq!(bonds.len(), 2);
    assert_eq!(bonds[1].stake, 20);
}

#[tokio::test]
async fn nonzero_exit_maps_to_error_kinds() {
    let node = fake_node(SCRIPT, 5_000);
    assert!(matches!(node.block("missing").await, Err(NodeError::NotFound(_))));
    let err = node.epoch_info().await.unwrap_err();
    assert!(matches!(err, NodeError::Unavailable(_)), "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn hung_command_times_out() {
    let node = fake_node("sleep 5", 100);
    let started = std::time::Instant::now();
    let err = node.last_finalized_block().await.unwrap_err();
    assert!(matches!(err, NodeError::Timeout { ms: 100, .. }), "{err}");
    assert!(started.elapsed() < std::time::Duration::from_secs(3));
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let node = CliNodeClient::new(NodeConfig {
        program: "/nonexistent/deployscan-node-cli".into(),
        global_args: vec![],
        ..NodeConfig::default()
    });
    let err = node.ping().await.unwrap_err();
    assert!(matches!(err, NodeError::Spawn { .. }), "{err}");
    let indexer: deployscan_core::IndexerError = err.into();
    assert_eq!(indexer.category(), deployscan_core::ErrorCategory::Configuration);
}

#[tokio::test]
async fn shell_missing_command_is_not_a_missing_block() {
    let node = fake_node("echo \"sh: rnode: not found\" >&2; exit 127", 5_000);
    let err = node.block("abc").await.unwrap_err();
    assert!(matches!(err, NodeError::Spawn { .. }), "{err}");
    assert!(!err.is_retryable());
}
