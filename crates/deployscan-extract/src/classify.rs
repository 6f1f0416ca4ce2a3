//! Deployment classification.
//!
//! Rules are checked in ascending `priority`; the first whose markers appear
//! in the source text wins, regardless of where in the text they appear.

use deployscan_core::types::DeploymentType;

/// A classification rule: the deployment gets `kind` if, for every group in
/// `all_of`, at least one marker of that group occurs in the source text.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub kind: DeploymentType,
    pub priority: u8,
    pub all_of: &'static [&'static [&'static str]],
}

impl ClassificationRule {
    pub fn matches(&self, term: &str) -> bool {
        self.all_of
            .iter()
            .all(|group| group.iter().any(|marker| term.contains(marker)))
    }
}

pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        kind: DeploymentType::TokenTransfer,
        priority: 1,
        all_of: &[&["RevVault", "revVault", "vault!", "Vault!"], &["\"transfer\""]],
    },
    ClassificationRule {
        kind: DeploymentType::ValidatorOperation,
        priority: 2,
        all_of: &[&[
            "rho:rchain:pos",
            "PoS!",
            "\"bond\"",
            "\"withdraw\"",
            "getBonds",
            "getActiveValidators",
        ]],
    },
    ClassificationRule {
        kind: DeploymentType::FinalizerContract,
        priority: 3,
        all_of: &[&["finalizer", "Finalizer", "\"finalize\""]],
    },
    ClassificationRule {
        kind: DeploymentType::RegistryLookup,
        priority: 4,
        all_of: &[&["rho:registry:lookup", "registryLookup"]],
    },
    ClassificationRule {
        kind: DeploymentType::AuctionContract,
        priority: 5,
        all_of: &[&["auction", "Auction", "\"bid\""]],
    },
];

/// Classify a (non-synthetic) deployment by its source text.
pub fn classify(term: &str) -> DeploymentType {
    classify_with(CLASSIFICATION_RULES, term)
}

pub fn classify_with(rules: &[ClassificationRule], term: &str) -> DeploymentType {
    let mut ordered: Vec<&ClassificationRule> = rules.iter().collect();
    ordered.sort_by_key(|r| r.priority);
    ordered
        .into_iter()
        .find(|r| r.matches(term))
        .map(|r| r.kind)
        .unwrap_or(DeploymentType::SmartContract)
}
