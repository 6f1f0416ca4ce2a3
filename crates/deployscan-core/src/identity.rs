//! Validator identity resolution.
//!
//! The node reports validators sometimes by full public key and sometimes by
//! an abbreviated display form (`04ab12cd...9f0e`). Every write path that
//! touches validator rows goes through [`KeyDirectory::resolve`] so the same
//! validator always lands on the same row.

use std::collections::BTreeSet;

const ELLIPSES: [&str; 3] = ["...", "…", ".."];

/// Canonical textual form of a key: trimmed, unquoted, lowercase, no `0x`.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('"').trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

/// Split an abbreviated key into `(prefix, suffix)`. Returns `None` for keys
/// without a truncation marker.
pub fn split_abbreviated(key: &str) -> Option<(&str, &str)> {
    ELLIPSES
        .iter()
        .find_map(|marker| key.find(marker).map(|i| (&key[..i], &key[i + marker.len()..])))
}

pub fn is_abbreviated(key: &str) -> bool {
    split_abbreviated(key).is_some()
}

/// Returns `true` if `candidate` (possibly abbreviated) denotes `full`.
pub fn matches_full_key(candidate: &str, full: &str, min_fragment: usize) -> bool {
    let candidate = normalize_key(candidate);
    let full = normalize_key(full);
    match split_abbreviated(&candidate) {
        None => candidate == full,
        Some((prefix, suffix)) => {
            prefix.len() >= min_fragment
                && prefix.len() + suffix.len() < full.len()
                && full.starts_with(prefix)
                && full.ends_with(suffix)
        }
    }
}

/// The set of full validator keys seen so far.
#[derive(Debug, Clone, Default)]
pub struct KeyDirectory {
    full_keys: BTreeSet<String>,
    min_fragment: usize,
}

impl KeyDirectory {
    pub fn new(min_fragment: usize) -> Self {
        Self {
            full_keys: BTreeSet::new(),
            min_fragment,
        }
    }

    /// Remember a key. Abbreviated keys are ignored.
    pub fn learn(&mut self, key: &str) {
        let key = normalize_key(key);
        if !key.is_empty() && !is_abbreviated(&key) {
            self.full_keys.insert(key);
        }
    }

    pub fn len(&self) -> usize {
        self.full_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.full_keys.is_empty()
    }

    /// Map `key` onto the canonical identity.
    ///
    /// Full keys are returned normalized. Abbreviated keys resolve to the
    /// unique known full key they match; if none or several match, the
    /// normalized abbreviated form is kept as the identity.
    pub fn resolve(&self, key: &str) -> String {
        let normalized = normalize_key(key);
        if !is_abbreviated(&normalized) {
            return normalized;
        }
        let mut matches = self
            .full_keys
            .iter()
            .filter(|full| matches_full_key(&normalized, full, self.min_fragment));
        match (matches.next(), matches.next()) {
            (Some(full), None) => full.clone(),
            (Some(_), Some(_)) => {
                tracing::warn!(key = %normalized, "abbreviated validator key is ambiguous, keeping as-is");
                normalized
            }
            _ => normalized,
        }
    }
}
