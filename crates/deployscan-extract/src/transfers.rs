//! Token transfer detection from contract source text.
//!
//! Best effort by nature: the rules recognise the transfer idioms seen on
//! chain, they do not evaluate Rholang. Each rule in [`TransferPattern`]
//! order may fire any number of times; every match is one candidate.
//! Variable operands are resolved against the nearest preceding binding in
//! the same text, candidates whose operands cannot be resolved are dropped,
//! and identical candidates collapse to one.

use std::collections::HashSet;

use regex::{Captures, Regex};

use deployscan_core::error::IndexerError;
use deployscan_core::types::{Transfer, TransferStatus};

use crate::address::AddressValidator;

const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";
const QUOTED: &str = r#""[^"\s]+""#;

/// The transfer idioms, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferPattern {
    /// `"<from>", "<to>", <amount>` literal triple.
    DirectLiteral,
    /// `vault!("transfer", "<to>", <amount>, ...)`.
    VaultTransferLiteral,
    /// `vault!("transfer", toVar, <amount>, ...)`.
    VaultTransferVariable,
    /// `match (<a>, <b>, <n>) { ... }` carrying two addresses and an amount.
    MatchTuple,
    /// `"findOrCreate", <from>, ...` followed by `"transfer", <to>, <amount>`.
    FindOrCreateTransfer,
}

impl TransferPattern {
    pub const ALL: [TransferPattern; 5] = [
        Self::DirectLiteral,
        Self::VaultTransferLiteral,
        Self::VaultTransferVariable,
        Self::MatchTuple,
        Self::FindOrCreateTransfer,
    ];

    fn regex_source(&self) -> String {
        let operand = format!("{QUOTED}|{IDENT}");
        let amount = format!(r"\d+|{IDENT}");
        match self {
            Self::DirectLiteral => format!(
                r#"(?P<from>{QUOTED})\s*,\s*(?P<to>{QUOTED})\s*,\s*(?P<amount>\d+)"#
            ),
            Self::VaultTransferLiteral => format!(
                r#"@?{IDENT}\s*!\s*\(\s*"transfer"\s*,\s*(?P<to>{QUOTED})\s*,\s*(?P<amount>{amount})"#
            ),
            Self::VaultTransferVariable => format!(
                r#"@?{IDENT}\s*!\s*\(\s*"transfer"\s*,\s*(?P<to>{IDENT})\s*,\s*(?P<amount>{amount})"#
            ),
            Self::MatchTuple => r"match\s*\(\s*(?P<body>[^(){}]*?)\s*\)\s*\{".to_string(),
            Self::FindOrCreateTransfer => format!(
                r#"(?s)"findOrCreate"\s*,\s*(?P<from>{operand})\s*,.*?"transfer"\s*,\s*(?P<to>{operand})\s*,\s*(?P<amount>{amount})"#
            ),
        }
    }
}

/// An operand as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Literal(String),
    Number(i64),
    Variable(String),
}

impl Operand {
    fn parse(token: &str) -> Option<Self> {
        let token = token.trim().trim_start_matches('@').trim();
        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            return Some(Self::Literal(token[1..token.len() - 1].to_string()));
        }
        if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            return token.parse().ok().map(Self::Number);
        }
        let mut chars = token.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                if chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    Some(Self::Variable(token.to_string()))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// A rule match before variable resolution. `from == None` means the
/// sender has to be inferred.
#[derive(Debug, Clone)]
struct Candidate {
    pattern: TransferPattern,
    at: usize,
    from: Option<Operand>,
    to: Operand,
    amount: Operand,
}

/// A name bound to a value at a byte offset of the source.
#[derive(Debug, Clone)]
struct Binding {
    name: String,
    value: Operand,
    at: usize,
}

struct Rule {
    pattern: TransferPattern,
    regex: Regex,
}

/// Compiled transfer rules plus the binding scanners.
pub struct TransferExtractor {
    rules: Vec<Rule>,
    assignment: Regex,
    destructuring: Regex,
    find_or_create: Regex,
    addresses: AddressValidator,
}

impl std::fmt::Debug for TransferExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferExtractor")
            .field("rules", &self.rules.iter().map(|r| r.pattern).collect::<Vec<_>>())
            .finish()
    }
}

fn compile(source: &str) -> Result<Regex, IndexerError> {
    Regex::new(source).map_err(|e| IndexerError::Configuration(format!("invalid pattern {source:?}: {e}")))
}

impl TransferExtractor {
    pub fn new(addresses: AddressValidator) -> Result<Self, IndexerError> {
        Self::with_patterns(addresses, &TransferPattern::ALL)
    }

    /// Build with a subset (or reordering) of the rules.
    pub fn with_patterns(addresses: AddressValidator, patterns: &[TransferPattern]) -> Result<Self, IndexerError> {
        let rules = patterns
            .iter()
            .map(|p| Ok(Rule { pattern: *p, regex: compile(&p.regex_source())? }))
            .collect::<Result<Vec<_>, IndexerError>>()?;
        Ok(Self {
            rules,
            assignment: compile(&format!(r#"(?P<name>{IDENT})\s*=\s*(?P<value>{QUOTED}|\d+)"#))?,
            destructuring: compile(
                r"match\s*\(\s*(?P<values>[^(){}]*?)\s*\)\s*\{\s*\(\s*(?P<names>[^(){}]*?)\s*\)\s*=>",
            )?,
            find_or_create: compile(&format!(r#""findOrCreate"\s*,\s*(?P<addr>{QUOTED}|{IDENT})"#))?,
            addresses,
        })
    }

    /// Extract the transfers carried by one deployment's source text.
    ///
    /// `deployer` is the sender of last resort when the text moves funds
    /// without naming the source vault.
    pub fn extract(
        &self,
        deploy_id: &str,
        block_height: u64,
        deployer: &str,
        term: &str,
        errored: bool,
    ) -> Vec<Transfer> {
        let bindings = self.bindings(term);
        let status = if errored {
            TransferStatus::Failed
        } else {
            TransferStatus::Success
        };

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for candidate in self.candidates(term) {
            let Some((from, to, amount)) = self.resolve(&candidate, &bindings, term, deployer) else {
                tracing::debug!(
                    deploy_id,
                    block_height,
                    pattern = ?candidate.pattern,
                    "transfer candidate dropped: unresolved operand"
                );
                continue;
            };
            if !self.addresses.is_valid(&from) || !self.addresses.is_valid(&to) || amount <= 0 {
                tracing::debug!(deploy_id, block_height, %from, %to, amount, "transfer candidate rejected");
                continue;
            }
            if seen.insert((from.clone(), to.clone(), amount)) {
                out.push(Transfer::new(deploy_id, block_height, from, to, amount, status));
            }
        }
        out
    }

    fn candidates(&self, term: &str) -> Vec<Candidate> {
        let mut out = Vec::new();
        for rule in &self.rules {
            for caps in rule.regex.captures_iter(term) {
                let at = caps.get(0).map_or(0, |m| m.start());
                let candidate = match rule.pattern {
                    TransferPattern::MatchTuple => tuple_candidate(&caps, at),
                    pattern => operand_candidate(pattern, &caps, at),
                };
                out.extend(candidate);
            }
        }
        out
    }

    fn resolve(
        &self,
        c: &Candidate,
        bindings: &[Binding],
        term: &str,
        deployer: &str,
    ) -> Option<(String, String, i64)> {
        let to = resolve_address(&c.to, bindings, c.at)?;
        let amount = resolve_amount(&c.amount, bindings, c.at)?;
        let from = match &c.from {
            Some(op) => resolve_address(op, bindings, c.at)?,
            None => self
                .inferred_sender(term, bindings, c.at, &to)
                .unwrap_or_else(|| deployer.to_string()),
        };
        Some((from, to, amount))
    }

    /// The first `findOrCreate` before `at` naming a vault other than `to`.
    fn inferred_sender(&self, term: &str, bindings: &[Binding], at: usize, to: &str) -> Option<String> {
        self.find_or_create
            .captures_iter(&term[..at])
            .filter_map(|caps| {
                let m = caps.name("addr")?;
                let op = Operand::parse(m.as_str())?;
                resolve_address(&op, bindings, m.start())
            })
            .find(|addr| addr != to)
    }

    fn bindings(&self, term: &str) -> Vec<Binding> {
        let mut out = Vec::new();
        for caps in self.assignment.captures_iter(term) {
            if let (Some(name), Some(value)) = (caps.name("name"), caps.name("value")) {
                if let Some(value) = Operand::parse(value.as_str()) {
                    out.push(Binding {
                        name: name.as_str().to_string(),
                        value,
                        at: name.start(),
                    });
                }
            }
        }
        for caps in self.destructuring.captures_iter(term) {
            let (Some(values), Some(names)) = (caps.name("values"), caps.name("names")) else {
                continue;
            };
            let at = caps.get(0).map_or(0, |m| m.start());
            for (value, name) in values.as_str().split(',').zip(names.as_str().split(',')) {
                if let (Some(value), Some(Operand::Variable(name))) = (Operand::parse(value), Operand::parse(name)) {
                    out.push(Binding { name, value, at });
                }
            }
        }
        out.sort_by_key(|b| b.at);
        out
    }
}

fn operand_candidate(pattern: TransferPattern, caps: &Captures<'_>, at: usize) -> Option<Candidate> {
    let from = match caps.name("from") {
        Some(m) => Some(Operand::parse(m.as_str())?),
        None => None,
    };
    Some(Candidate {
        pattern,
        at,
        from,
        to: Operand::parse(caps.name("to")?.as_str())?,
        amount: Operand::parse(caps.name("amount")?.as_str())?,
    })
}

/// A `match` tuple qualifies when it holds two string literals and a number.
fn tuple_candidate(caps: &Captures<'_>, at: usize) -> Option<Candidate> {
    let ops: Vec<Operand> = caps
        .name("body")?
        .as_str()
        .split(',')
        .map(Operand::parse)
        .collect::<Option<_>>()?;
    let mut literals = ops.iter().filter(|o| matches!(o, Operand::Literal(_)));
    let from = literals.next()?.clone();
    let to = literals.next()?.clone();
    let amount = ops.iter().find(|o| matches!(o, Operand::Number(_)))?.clone();
    Some(Candidate {
        pattern: TransferPattern::MatchTuple,
        at,
        from: Some(from),
        to,
        amount,
    })
}

/// Nearest binding of `name` that starts before `at`.
fn lookup<'a>(name: &str, bindings: &'a [Binding], at: usize) -> Option<&'a Operand> {
    bindings
        .iter()
        .rev()
        .find(|b| b.at < at && b.name == name)
        .map(|b| &b.value)
}

fn resolve_address(op: &Operand, bindings: &[Binding], at: usize) -> Option<String> {
    match op {
        Operand::Literal(s) => Some(s.clone()),
        Operand::Variable(name) => match lookup(name, bindings, at)? {
            Operand::Literal(s) => Some(s.clone()),
            _ => None,
        },
        Operand::Number(_) => None,
    }
}

fn resolve_amount(op: &Operand, bindings: &[Binding], at: usize) -> Option<i64> {
    match op {
        Operand::Number(n) => Some(*n),
        Operand::Variable(name) => match lookup(name, bindings, at)? {
            Operand::Number(n) => Some(*n),
            _ => None,
        },
        Operand::Literal(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployscan_core::config::AddressRules;

    const FROM: &str = "1111AtahZeefej4tvVR6ti9TJtv8yxLebvyMhCXD5EGNdbyBtbDqg";
    const TO: &str = "11112ZM9yrfaTrzCCbKjPbxBncjNCkMFsPqtcLFvhBf4Kqx6rpir2w";
    const DEPLOYER: &str = "04ffc016579a68050d655d55df4e09f04605164543e257c8e6df10361e6068a5336588e9b355ea859c5ab4285a5ef0efdf62bc28b80320ce99e26bb1607b3ad93d";

    fn extractor() -> TransferExtractor {
        TransferExtractor::new(AddressValidator::new(AddressRules::default())).unwrap()
    }

    fn run(term: &str) -> Vec<Transfer> {
        extractor().extract("sig1", 10, DEPLOYER, term, false)
    }

    #[test]
    fn fixtures_are_valid_addresses() {
        let v = AddressValidator::new(AddressRules::default());
        assert!(v.is_token_address(FROM), "{}", FROM.len());
        assert!(v.is_token_address(TO), "{}", TO.len());
        assert!(v.is_public_key(DEPLOYER));
    }

    #[test]
    fn variable_bound_recipient_is_resolved() {
        let term = format!(r#"new ret in {{ addr = "{TO}" | @vault!("transfer", addr, 500, *key, *ret) }}"#);
        let out = run(&term);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_address, TO);
        assert_eq!(out[0].from_address, DEPLOYER);
        assert_eq!(out[0].amount_dust(), 500);
    }

    #[test]
    fn unbound_variable_drops_candidate() {
        let term = r#"@vault!("transfer", nowhere, 500, *key, *ret)"#;
        assert!(run(term).is_empty());
    }

    #[test]
    fn binding_after_use_does_not_count() {
        let term = format!(r#"@vault!("transfer", addr, 500, *key, *ret) | addr = "{TO}""#);
        assert!(run(&term).is_empty());
    }

    #[test]
    fn literal_vault_transfer_with_find_or_create_sender() {
        let term = format!(
            r#"@RevVault!("findOrCreate", "{FROM}", *vaultCh) | for (@(true, vault) <- vaultCh) {{ @vault!("transfer", "{TO}", 42, *key, *ret) }}"#
        );
        let out = run(&term);
        assert_eq!(out.len(), 1, "{out:?}");
        assert_eq!(out[0].from_address, FROM);
        assert_eq!(out[0].to_address, TO);
        assert_eq!(out[0].amount_dust(), 42);
    }

    #[test]
    fn standard_transfer_template_yields_one_transfer() {
        let term = format!(
            r#"new rl(`rho:registry:lookup`), RevVaultCh, vaultCh, toVaultCh, deployerId(`rho:rchain:deployerId`), revVaultKeyCh, resultCh in {{
  rl!(`rho:rchain:revVault`, *RevVaultCh) |
  for (@(_, RevVault) <- RevVaultCh) {{
    match ("{FROM}", "{TO}", 100000000) {{
      (revAddrFrom, revAddrTo, amount) => {{
        @RevVault!("findOrCreate", revAddrFrom, *vaultCh) |
        @RevVault!("findOrCreate", revAddrTo, *toVaultCh) |
        @RevVault!("deployerAuthKey", *deployerId, *revVaultKeyCh) |
        for (@(true, vault) <- vaultCh; key <- revVaultKeyCh; _ <- toVaultCh) {{
          @vault!("transfer", revAddrTo, amount, *key, *resultCh)
        }}
      }}
    }}
  }}
}}"#
        );
        let out = run(&term);
        assert_eq!(out.len(), 1, "{out:?}");
        assert_eq!(out[0].from_address, FROM);
        assert_eq!(out[0].to_address, TO);
        assert_eq!(out[0].amount_dust(), 100_000_000);
        assert_eq!(out[0].amount_rev().to_string(), "1.00000000");
    }

    #[test]
    fn each_pattern_fires_on_its_own() {
        let cases = [
            (TransferPattern::DirectLiteral, format!(r#"("{FROM}", "{TO}", 7)"#)),
            (TransferPattern::VaultTransferLiteral, format!(r#"@vault!("transfer", "{TO}", 7, *k)"#)),
            (TransferPattern::VaultTransferVariable, format!(r#"x = "{TO}" | vault!("transfer", x, 7, *k)"#)),
            (TransferPattern::MatchTuple, format!(r#"match (7, "{FROM}", "{TO}") {{ _ => Nil }}"#)),
            (
                TransferPattern::FindOrCreateTransfer,
                format!(r#"@R!("findOrCreate", "{FROM}", *c) | v!("transfer", "{TO}", 7, *k)"#),
            ),
        ];
        for (pattern, term) in cases {
            let ex = TransferExtractor::with_patterns(AddressValidator::new(AddressRules::default()), &[pattern]).unwrap();
            let out = ex.extract("d", 1, DEPLOYER, &term, false);
            assert_eq!(out.len(), 1, "{pattern:?}: {out:?}");
            assert_eq!(out[0].to_address, TO, "{pattern:?}");
            assert_eq!(out[0].amount_dust(), 7, "{pattern:?}");
        }
    }

    #[test]
    fn invalid_addresses_rejected() {
        let term = r#"("1111short", "1111tiny", 9)"#;
        assert!(run(term).is_empty());
    }

    #[test]
    fn errored_deploy_marks_transfer_failed() {
        let term = format!(r#"("{FROM}", "{TO}", 9)"#);
        let out = extractor().extract("d", 1, DEPLOYER, &term, true);
        assert_eq!(out[0].status, TransferStatus::Failed);
    }

    #[test]
    fn distinct_transfers_are_kept() {
        let term = format!(r#"("{FROM}", "{TO}", 9) | ("{TO}", "{FROM}", 3)"#);
        assert_eq!(run(&term).len(), 2);
    }

    #[test]
    fn extraction_is_deterministic() {
        let term = format!(r#"match ("{FROM}", "{TO}", 5) {{ (a, b, n) => {{ @v!("transfer", b, n, *k) }} }}"#);
        let first = run(&term);
        for _ in 0..5 {
            assert_eq!(run(&term), first);
        }
    }
}
