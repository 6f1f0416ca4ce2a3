//! Parsers for node CLI output.
//!
//! Every parser accepts two formats: the primary nested camelCase JSON the
//! node emits by default, and a secondary format that is either flat
//! snake_case JSON or `key: value` text (one record per paragraph). Field
//! lookups try every known spelling, numbers are accepted as JSON numbers
//! or numeric strings. An output that is JSON `null` or says "not found" is
//! [`NodeError::NotFound`]; anything unreadable is [`NodeError::Malformed`].

use serde_json::{Map, Value};

use deployscan_core::raw::{
    BlockSummary, ConsensusStatus, EpochInfo, GenesisAllocation, Justification, MainChainEntry, RawBlock, RawBond,
    RawDeploy,
};

use crate::error::NodeError;

const BLOCK_INFO: &[&str] = &["blockInfo", "block_info"];
const HEIGHT: &[&str] = &["blockNumber", "block_number", "height"];
const HASH: &[&str] = &["blockHash", "block_hash", "hash"];
const PARENTS: &[&str] = &["parentsHashList", "parents_hash_list", "parents"];
const PARENT: &[&str] = &["parentHash", "parent_hash"];
const SENDER: &[&str] = &["sender", "proposer"];
const DEPLOYS: &[&str] = &["deploys", "deployments"];
const VALIDATOR: &[&str] = &["validator", "publicKey", "public_key"];

// ─── Entry points ─────────────────────────────────────────────────────────────

pub fn parse_block_summary(command: &str, out: &str) -> Result<BlockSummary, NodeError> {
    let v = load_record(command, out)?;
    summary_from(&v).map_err(|reason| NodeError::malformed(command, reason))
}

/// Range output: a JSON array (or `{"blocks": [...]}`) or text paragraphs.
/// Returned ascending by height.
pub fn parse_block_summaries(command: &str, out: &str) -> Result<Vec<BlockSummary>, NodeError> {
    let entries = match load_json(command, out)? {
        Some(v) => list_of(v, &["blocks"]),
        None => text_records(out),
    };
    let mut blocks = entries
        .iter()
        .map(summary_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| NodeError::malformed(command, reason))?;
    blocks.sort_by_key(|b| b.height);
    Ok(blocks)
}

/// Full block detail. Deploys that cannot be read are skipped and counted in
/// [`RawBlock::skipped_deploys`].
pub fn parse_block(command: &str, out: &str) -> Result<RawBlock, NodeError> {
    let v = load_record(command, out)?;
    let info = field(&v, BLOCK_INFO).unwrap_or(&v);
    let summary = summary_from(&v).map_err(|reason| NodeError::malformed(command, reason))?;

    let mut deploys = Vec::new();
    let mut skipped = 0u32;
    let entries = field(&v, DEPLOYS)
        .or_else(|| field(info, DEPLOYS))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for (i, entry) in entries.iter().enumerate() {
        match deploy_from(entry) {
            Ok(d) => deploys.push(d),
            Err(reason) => {
                skipped += 1;
                tracing::warn!(block_height = summary.height, index = i, %reason, "skipping unreadable deploy");
            }
        }
    }

    Ok(RawBlock {
        height: summary.height,
        hash: summary.hash,
        parent_hash: summary.parent_hash,
        timestamp: summary.timestamp,
        proposer: summary.proposer,
        pre_state_hash: str_field(info, &["preStateHash", "pre_state_hash"]).unwrap_or_default(),
        post_state_hash: str_field(info, &["postStateHash", "post_state_hash"]).unwrap_or_default(),
        finalized: bool_field(info, &["isFinalized", "is_finalized", "finalized"]).unwrap_or(false),
        fault_tolerance: f64_field(info, &["faultTolerance", "fault_tolerance"]).unwrap_or(0.0),
        bonds: field(info, &["bonds"]).map(bonds_from).unwrap_or_default(),
        justifications: field(info, &["justifications"])
            .and_then(Value::as_array)
            .map(|js| js.iter().filter_map(justification_from).collect())
            .unwrap_or_default(),
        deploys,
        allocations: field(&v, &["allocations", "genesisAllocations", "genesis_allocations"])
            .or_else(|| field(info, &["allocations", "genesisAllocations", "genesis_allocations"]))
            .and_then(Value::as_array)
            .map(|xs| xs.iter().filter_map(allocation_from).collect())
            .unwrap_or_default(),
        skipped_deploys: skipped,
    })
}

pub fn parse_deploy(command: &str, out: &str) -> Result<RawDeploy, NodeError> {
    let v = load_record(command, out)?;
    let entry = field(&v, &["deploy", "deployInfo", "deploy_info"]).unwrap_or(&v);
    deploy_from(entry).map_err(|reason| NodeError::malformed(command, reason))
}

/// Bonds as an array of `{validator, stake}`, a `{key: stake}` map, or
/// `key: stake` text lines.
pub fn parse_bonds(command: &str, out: &str) -> Result<Vec<RawBond>, NodeError> {
    let bonds = match load_json(command, out)? {
        Some(v) => bonds_from(field(&v, &["bonds"]).unwrap_or(&v)),
        None => out
            .lines()
            .filter_map(split_pair)
            .filter_map(|(k, v)| Some(RawBond { validator: k.to_string(), stake: v.parse().ok()? }))
            .collect(),
    };
    if bonds.is_empty() && !out.trim().is_empty() && out.trim() != "[]" && out.trim() != "{}" {
        return Err(NodeError::malformed(command, "no bond entries recognised"));
    }
    Ok(bonds)
}

pub fn parse_active_validators(command: &str, out: &str) -> Result<Vec<String>, NodeError> {
    let keys = match load_json(command, out)? {
        Some(v) => list_of(v, &["validators", "activeValidators", "active_validators"])
            .iter()
            .filter_map(|x| as_string(x).or_else(|| str_field(x, VALIDATOR)))
            .collect(),
        None => out
            .lines()
            .map(|l| l.trim().trim_start_matches("- ").trim_end_matches(',').trim().trim_matches('"'))
            .filter(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_hexdigit() || c == '.' || c == '…'))
            .map(str::to_string)
            .collect(),
    };
    Ok(keys)
}

pub fn parse_epoch_info(command: &str, out: &str) -> Result<EpochInfo, NodeError> {
    let v = load_record(command, out)?;
    let v = field(&v, &["epochInfo", "epoch_info"]).unwrap_or(&v);
    let current_epoch = u64_field(v, &["currentEpoch", "current_epoch", "epoch"])
        .ok_or_else(|| NodeError::malformed(command, "missing current epoch"))?;
    let epoch_length = u64_field(v, &["epochLength", "epoch_length"])
        .ok_or_else(|| NodeError::malformed(command, "missing epoch length"))?;
    let start_block = match u64_field(v, &["startBlock", "start_block", "epochStartBlock", "epoch_start_block"]) {
        Some(start) => start,
        None => current_epoch.checked_mul(epoch_length).ok_or_else(|| {
            NodeError::malformed(command, format!("epoch {current_epoch} with length {epoch_length} overflows"))
        })?,
    };
    Ok(EpochInfo {
        current_epoch,
        epoch_length,
        quarantine_length: u64_field(v, &["quarantineLength", "quarantine_length"]).unwrap_or(0),
        start_block,
    })
}

pub fn parse_consensus_status(command: &str, out: &str) -> Result<ConsensusStatus, NodeError> {
    let v = load_record(command, out)?;
    let count = |names: &[&str]| {
        field(&v, names)
            .and_then(|x| x.as_array().map(|a| a.len() as u64).or_else(|| as_u64(x)))
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
    };
    let last_finalized_height = u64_field(
        &v,
        &["lastFinalizedBlockNumber", "last_finalized_block_number", "lastFinalizedHeight", "last_finalized_height"],
    )
    .ok_or_else(|| NodeError::malformed(command, "missing last finalized height"))?;
    let active_validators = count(&["activeValidators", "active_validators", "activeValidatorsCount"]).unwrap_or(0);
    Ok(ConsensusStatus {
        last_finalized_height,
        total_validators: count(&["totalValidators", "total_validators", "validatorCount", "validator_count"])
            .unwrap_or(active_validators),
        active_validators,
        quarantined_validators: count(&["quarantinedValidators", "quarantined_validators"]).unwrap_or(0),
        fault_tolerance: f64_field(&v, &["faultTolerance", "fault_tolerance"]),
    })
}

/// Main chain as a JSON list of blocks, text paragraphs, or `height hash` lines.
pub fn parse_main_chain(command: &str, out: &str) -> Result<Vec<MainChainEntry>, NodeError> {
    let entries = match load_json(command, out)? {
        Some(v) => list_of(v, &["blocks", "mainChain", "main_chain"]),
        None => {
            let records = text_records(out);
            if records.iter().any(|r| field(r, HEIGHT).is_some()) {
                records
            } else {
                return Ok(out
                    .lines()
                    .filter_map(|l| {
                        let mut parts = l.split_whitespace();
                        let height = parts.next()?.parse().ok()?;
                        let hash = parts.next()?.trim_matches('"').to_string();
                        Some(MainChainEntry { height, hash })
                    })
                    .collect());
            }
        }
    };
    entries
        .iter()
        .map(|e| summary_from(e).map(|s| MainChainEntry { height: s.height, hash: s.hash }))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| NodeError::malformed(command, reason))
}

// ─── Record builders ──────────────────────────────────────────────────────────

fn summary_from(v: &Value) -> Result<BlockSummary, String> {
    let info = field(v, BLOCK_INFO).unwrap_or(v);
    let parent_hash = field(info, PARENTS)
        .and_then(|p| p.as_array()?.first().and_then(as_string))
        .or_else(|| str_field(info, PARENT))
        .unwrap_or_default();
    let deploy_count = u64_field(info, &["deployCount", "deploy_count"])
        .or_else(|| field(v, DEPLOYS).and_then(Value::as_array).map(|d| d.len() as u64))
        .unwrap_or(0);
    Ok(BlockSummary {
        height: u64_field(info, HEIGHT).ok_or("missing block number")?,
        hash: str_field(info, HASH).filter(|h| !h.is_empty()).ok_or("missing block hash")?,
        parent_hash,
        timestamp: i64_field(info, &["timestamp"]).unwrap_or(0),
        proposer: str_field(info, SENDER).unwrap_or_default(),
        deploy_count: u32::try_from(deploy_count).map_err(|_| format!("deploy count {deploy_count} out of range"))?,
    })
}

fn deploy_from(v: &Value) -> Result<RawDeploy, String> {
    if !v.is_object() {
        return Err("deploy entry is not an object".into());
    }
    Ok(RawDeploy {
        deploy_id: str_field(v, &["sig", "deployId", "deploy_id", "signature"]).ok_or("missing deploy signature")?,
        deployer: str_field(v, &["deployer"]).ok_or("missing deployer")?,
        term: str_field(v, &["term"]).ok_or("missing term")?,
        timestamp: i64_field(v, &["timestamp"]).unwrap_or(0),
        phlo_price: i64_field(v, &["phloPrice", "phlo_price"]).unwrap_or(0),
        phlo_limit: i64_field(v, &["phloLimit", "phlo_limit"]).unwrap_or(0),
        cost: i64_field(v, &["cost", "phloCost", "phlo_cost"]).unwrap_or(0),
        errored: bool_field(v, &["errored"]).unwrap_or(false),
        error_message: str_field(v, &["systemDeployError", "system_deploy_error", "errorMessage", "error_message"]),
    })
}

fn bonds_from(v: &Value) -> Vec<RawBond> {
    match v {
        Value::Array(xs) => xs
            .iter()
            .filter_map(|b| {
                Some(RawBond {
                    validator: str_field(b, VALIDATOR)?,
                    stake: i64_field(b, &["stake"])?,
                })
            })
            .collect(),
        Value::Object(m) => m
            .iter()
            .filter_map(|(k, s)| Some(RawBond { validator: k.clone(), stake: as_i64(s)? }))
            .collect(),
        _ => Vec::new(),
    }
}

fn justification_from(v: &Value) -> Option<Justification> {
    Some(Justification {
        validator: str_field(v, VALIDATOR)?,
        latest_block_hash: str_field(v, &["latestBlockHash", "latest_block_hash"])?,
    })
}

fn allocation_from(v: &Value) -> Option<GenesisAllocation> {
    Some(GenesisAllocation {
        address: str_field(v, &["address", "revAddress", "rev_address"])?,
        amount_dust: i64_field(v, &["amount", "amountDust", "amount_dust"])?,
    })
}

// ─── Loading ──────────────────────────────────────────────────────────────────

/// Parse `out` as JSON. `Ok(None)` means the output is not JSON.
fn load_json(command: &str, out: &str) -> Result<Option<Value>, NodeError> {
    let trimmed = out.trim();
    if trimmed.is_empty() {
        return Err(NodeError::malformed(command, "empty output"));
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Null) => Err(NodeError::NotFound(command.to_string())),
        Ok(v) => Ok(Some(v)),
        Err(_) if is_not_found(trimmed) => Err(NodeError::NotFound(command.to_string())),
        Err(_) => Ok(None),
    }
}

/// A single record: JSON, or every `key: value` line folded into one object.
fn load_record(command: &str, out: &str) -> Result<Value, NodeError> {
    if let Some(v) = load_json(command, out)? {
        return Ok(v);
    }
    let mut merged = Map::new();
    for record in text_records(out) {
        if let Value::Object(m) = record {
            for (k, v) in m {
                merged.entry(k).or_insert(v);
            }
        }
    }
    if merged.is_empty() {
        return Err(NodeError::malformed(command, "output is neither JSON nor key: value text"));
    }
    Ok(Value::Object(merged))
}

pub(crate) fn is_not_found(text: &str) -> bool {
    text.to_ascii_lowercase().contains("not found")
}

fn list_of(v: Value, keys: &[&str]) -> Vec<Value> {
    match v {
        Value::Array(xs) => xs,
        Value::Object(mut m) => {
            if let Some(key) = keys.iter().find(|k| matches!(m.get(**k), Some(Value::Array(_)))) {
                if let Some(Value::Array(xs)) = m.remove(*key) {
                    return xs;
                }
            }
            vec![Value::Object(m)]
        }
        other => vec![other],
    }
}

/// Paragraph-separated `key: value` records with snake_case keys.
fn text_records(out: &str) -> Vec<Value> {
    let mut records = Vec::new();
    let mut current = Map::new();
    for line in out.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                records.push(Value::Object(std::mem::take(&mut current)));
            }
            continue;
        }
        if let Some((k, v)) = split_pair(line) {
            current.entry(snake_key(k)).or_insert_with(|| Value::String(v.to_string()));
        }
    }
    if !current.is_empty() {
        records.push(Value::Object(current));
    }
    records
}

fn split_pair(line: &str) -> Option<(&str, &str)> {
    let (k, v) = line.split_once(':')?;
    let k = k.trim().trim_start_matches("- ").trim().trim_matches('"');
    let v = v.trim().trim_end_matches(',').trim().trim_matches('"');
    (!k.is_empty()).then_some((k, v))
}

/// `"Block Number"`, `"blockNumber"` and `"block-number"` all become `block_number`.
fn snake_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.chars() {
        if c == ' ' || c == '-' || c == '_' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        } else if c.is_ascii_uppercase() {
            if prev_lower && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

// ─── Field access ─────────────────────────────────────────────────────────────

fn field<'a>(v: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().filter_map(|n| v.get(*n)).find(|x| !x.is_null())
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn str_field(v: &Value, names: &[&str]) -> Option<String> {
    field(v, names).and_then(as_string)
}

fn u64_field(v: &Value, names: &[&str]) -> Option<u64> {
    field(v, names).and_then(as_u64)
}

fn i64_field(v: &Value, names: &[&str]) -> Option<i64> {
    field(v, names).and_then(as_i64)
}

fn f64_field(v: &Value, names: &[&str]) -> Option<f64> {
    field(v, names).and_then(|x| match x {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn bool_field(v: &Value, names: &[&str]) -> Option<bool> {
    field(v, names).and_then(|x| match x {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED_BLOCK: &str = r#"{
      "blockInfo": {
        "blockHash": "b5",
        "sender": "04aa",
        "seqNum": 5,
        "sig": "s",
        "sigAlgorithm": "secp256k1",
        "shardId": "root",
        "version": 1,
        "timestamp": 1700000000005,
        "headerExtraBytes": "",
        "parentsHashList": ["b4"],
        "blockNumber": 5,
        "preStateHash": "pre5",
        "postStateHash": "post5",
        "bodyExtraBytes": "",
        "bonds": [{"validator": "04aa", "stake": 100}, {"validator": "04bb", "stake": 200}],
        "blockSize": "1024",
        "deployCount": 3,
        "faultTolerance": 0.25,
        "justifications": [{"validator": "04bb", "latestBlockHash": "b3"}]
      },
      "deploys": [
        {"deployer": "04cc", "term": "Nil", "timestamp": 1, "sig": "d1", "sigAlgorithm": "secp256k1",
         "phloPrice": 1, "phloLimit": 1000, "validAfterBlockNumber": 0, "cost": 10, "errored": false,
         "systemDeployError": ""},
        {"deployer": "04cc", "timestamp": 2, "sig": "d2"},
        {"deployer": "04dd", "term": "new x in { x!(1) }", "timestamp": 3, "sig": "d3",
         "phloPrice": "1", "phloLimit": "1000", "cost": "7", "errored": true, "systemDeployError": "out of phlo"}
      ]
    }"#;

    #[test]
    fn nested_camel_case_block() {
        let b = parse_block("get-block", NESTED_BLOCK).unwrap();
        assert_eq!(b.height, 5);
        assert_eq!(b.hash, "b5");
        assert_eq!(b.parent_hash, "b4");
        assert_eq!(b.proposer, "04aa");
        assert_eq!(b.bonds.len(), 2);
        assert_eq!(b.justifications[0].latest_block_hash, "b3");
        assert_eq!(b.fault_tolerance, 0.25);
        assert_eq!(b.deploys.len(), 2, "deploy without a term is skipped");
        assert_eq!(b.skipped_deploys, 1);
        assert_eq!(b.deploys[0].error_message.as_deref(), Some(""));
        assert_eq!(b.deploys[1].cost, 7);
        assert_eq!(b.deploys[1].error_message.as_deref(), Some("out of phlo"));
    }

    #[test]
    fn flat_snake_case_block() {
        let out = r#"{"block_number": 9, "block_hash": "b9", "parent_hash": "b8", "proposer": "04aa",
                      "timestamp": "17", "finalized": true, "bonds": {"04aa": 5},
                      "deploys": [{"deploy_id": "x", "deployer": "04aa", "term": "Nil", "error_message": null}]}"#;
        let b = parse_block("get-block", out).unwrap();
        assert_eq!((b.height, b.hash.as_str(), b.parent_hash.as_str()), (9, "b9", "b8"));
        assert!(b.finalized);
        assert_eq!(b.timestamp, 17);
        assert_eq!(b.bonds, vec![RawBond { validator: "04aa".into(), stake: 5 }]);
        assert_eq!(b.deploys[0].deploy_id, "x");
        assert_eq!(b.deploys[0].error_message, None);
    }

    #[test]
    fn text_block_header() {
        let out = "Block Number: 12\nBlock Hash: \"b12\"\nParent Hash: b11\nSender: 04aa\nTimestamp: 99\n";
        let s = parse_block_summary("last-finalized-block", out).unwrap();
        assert_eq!(s.height, 12);
        assert_eq!(s.hash, "b12");
        assert_eq!(s.parent_hash, "b11");
        assert_eq!(s.timestamp, 99);
    }

    #[test]
    fn not_found_and_null() {
        assert!(matches!(parse_block("get-block", "null"), Err(NodeError::NotFound(_))));
        assert!(matches!(
            parse_block("get-block", "Error: Block not found: abc"),
            Err(NodeError::NotFound(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(parse_block("get-block", "]]]"), Err(NodeError::Malformed { .. })));
        assert!(matches!(parse_block("get-block", ""), Err(NodeError::Malformed { .. })));
        assert!(matches!(parse_block("get-block", r#"{"foo": 1}"#), Err(NodeError::Malformed { .. })));
    }

    #[test]
    fn summaries_sorted_ascending() {
        let out = r#"[{"blockHash": "b2", "blockNumber": 2, "parentsHashList": ["b1"]},
                      {"blockHash": "b1", "blockNumber": 1, "parentsHashList": ["b0"], "deployCount": 4}]"#;
        let s = parse_block_summaries("get-blocks-by-height", out).unwrap();
        assert_eq!(s.iter().map(|b| b.height).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(s[0].deploy_count, 4);

        let text = "block_number: 3\nblock_hash: b3\n\nblock_number: 4\nblock_hash: b4\n";
        let s = parse_block_summaries("get-blocks-by-height", text).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s[1].hash, "b4");
    }

    #[test]
    fn bonds_in_all_shapes() {
        let expected = vec![RawBond { validator: "04aa".into(), stake: 7 }];
        assert_eq!(parse_bonds("bonds", r#"[{"validator": "04aa", "stake": 7}]"#).unwrap(), expected);
        assert_eq!(parse_bonds("bonds", r#"{"bonds": {"04aa": 7}}"#).unwrap(), expected);
        assert_eq!(parse_bonds("bonds", "04aa: 7\n").unwrap(), expected);
        assert!(parse_bonds("bonds", "[]").unwrap().is_empty());
    }

    #[test]
    fn active_validators_list_and_text() {
        let v = parse_active_validators("active-validators", r#"{"validators": ["04aa", {"publicKey": "04bb"}]}"#).unwrap();
        assert_eq!(v, vec!["04aa", "04bb"]);
        let v = parse_active_validators("active-validators", "04aa\n- 04bb...cc\n\n").unwrap();
        assert_eq!(v, vec!["04aa", "04bb...cc"]);
    }

    #[test]
    fn epoch_info_defaults_start_block() {
        let e = parse_epoch_info("epoch-info", r#"{"currentEpoch": 3, "epochLength": 100, "quarantineLength": 50}"#).unwrap();
        assert_eq!(e.start_block, 300);
        assert_eq!(e.end_block(), 399);
        let e = parse_epoch_info("epoch-info", "Current Epoch: 2\nEpoch Length: 10\nStart Block: 21\n").unwrap();
        assert_eq!((e.current_epoch, e.start_block), (2, 21));
    }

    #[test]
    fn oversized_numbers_are_malformed() {
        let huge = format!(r#"{{"currentEpoch": {}, "epochLength": 4}}"#, u64::MAX / 2);
        assert!(matches!(parse_epoch_info("epoch-info", &huge), Err(NodeError::Malformed { .. })));

        let out = format!(r#"{{"blockInfo": {{"blockNumber": 1, "blockHash": "h1", "deployCount": {}}}}}"#, u64::from(u32::MAX) + 1);
        assert!(matches!(parse_block_summary("last-finalized-block", &out), Err(NodeError::Malformed { .. })));
    }

    #[test]
    fn consensus_status_counts_arrays() {
        let c = parse_consensus_status(
            "network-consensus",
            r#"{"lastFinalizedBlockNumber": 88, "activeValidators": ["a", "b"], "totalValidators": 3}"#,
        )
        .unwrap();
        assert_eq!(c.last_finalized_height, 88);
        assert_eq!(c.active_validators, 2);
        assert_eq!(c.total_validators, 3);
        assert_eq!(c.fault_tolerance, None);
    }

    #[test]
    fn main_chain_formats() {
        let json = r#"[{"blockInfo": {"blockNumber": 5, "blockHash": "b5"}}, {"blockNumber": 4, "blockHash": "b4"}]"#;
        let m = parse_main_chain("show-main-chain", json).unwrap();
        assert_eq!(m[0], MainChainEntry { height: 5, hash: "b5".into() });
        let m = parse_main_chain("show-main-chain", "5 b5\n4 b4\n").unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m[1].hash, "b4");
    }

    #[test]
    fn snake_key_variants() {
        assert_eq!(snake_key("Block Number"), "block_number");
        assert_eq!(snake_key("blockNumber"), "block_number");
        assert_eq!(snake_key("block-number"), "block_number");
        assert_eq!(snake_key("preStateHash"), "pre_state_hash");
    }
}
