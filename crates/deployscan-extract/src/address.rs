//! Address validation.

use deployscan_core::config::AddressRules;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Checks candidate strings against the configured address windows.
#[derive(Debug, Clone)]
pub struct AddressValidator {
    rules: AddressRules,
}

impl AddressValidator {
    pub fn new(rules: AddressRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &AddressRules {
        &self.rules
    }

    /// Prefixed base-58 token address within the length window.
    pub fn is_token_address(&self, s: &str) -> bool {
        let len = s.chars().count();
        s.starts_with(self.rules.rev_prefix.as_str())
            && (self.rules.rev_min_len..=self.rules.rev_max_len).contains(&len)
            && s.chars().all(|c| BASE58_ALPHABET.contains(c))
    }

    /// Hex-encoded public key within the length window.
    pub fn is_public_key(&self, s: &str) -> bool {
        (self.rules.pubkey_min_len..=self.rules.pubkey_max_len).contains(&s.len())
            && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn is_valid(&self, s: &str) -> bool {
        self.is_token_address(s) || self.is_public_key(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(len: usize) -> String {
        let mut s = String::from("1111");
        while s.len() < len {
            s.push('a');
        }
        s
    }

    #[test]
    fn token_address_window_is_inclusive() {
        let v = AddressValidator::new(AddressRules::default());
        assert!(!v.is_token_address(&rev(52)));
        assert!(v.is_token_address(&rev(53)));
        assert!(v.is_token_address(&rev(57)));
        assert!(!v.is_token_address(&rev(58)));
    }

    #[test]
    fn token_address_rejects_non_base58() {
        let v = AddressValidator::new(AddressRules::default());
        let mut s = rev(54);
        s.push('0');
        assert!(!v.is_token_address(&s));
        assert!(!v.is_token_address(&rev(54).replace("1111", "2222")));
    }

    #[test]
    fn window_is_tunable() {
        let v = AddressValidator::new(AddressRules {
            rev_min_len: 40,
            rev_max_len: 60,
            ..Default::default()
        });
        assert!(v.is_token_address(&rev(45)));
    }

    #[test]
    fn public_key_window() {
        let v = AddressValidator::new(AddressRules::default());
        assert!(v.is_public_key(&"0a".repeat(65)));
        assert!(v.is_public_key(&"ab".repeat(33)));
        assert!(!v.is_public_key(&"ab".repeat(32)));
        assert!(!v.is_public_key(&"zz".repeat(40)));
    }
}
