//! One-time confirmation tokens
//!
//! A token is bound into the checkout success URL and checked again when the
//! customer lands on the confirmation endpoint.

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

const TOKEN_BYTES: usize = 32;

/// 256-bit random token, hex encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OneTimeToken(String);

impl OneTimeToken {
    /// Generate a fresh token from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accept a presented token only if it has the shape we generate.
    pub fn parse(s: &str) -> Option<Self> {
        let well_formed = s.len() == TOKEN_BYTES * 2
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(s.to_string()))
    }

    /// Rebuild a token read back from storage.
    pub fn from_stored(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare without short-circuiting on the first differing byte.
    pub fn matches(&self, presented: &OneTimeToken) -> bool {
        self.0.as_bytes().ct_eq(presented.0.as_bytes()).into()
    }
}

impl std::fmt::Debug for OneTimeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OneTimeToken(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_well_formed_and_distinct() {
        let a = OneTimeToken::generate();
        let b = OneTimeToken::generate();
        assert_eq!(a.as_str().len(), 64);
        assert!(OneTimeToken::parse(a.as_str()).is_some());
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(OneTimeToken::parse("").is_none());
        assert!(OneTimeToken::parse("tok_xyz").is_none());
        assert!(OneTimeToken::parse(&"G".repeat(64)).is_none());
        assert!(OneTimeToken::parse(&"A".repeat(64)).is_none());
        assert!(OneTimeToken::parse(&"a".repeat(63)).is_none());
    }

    #[test]
    fn test_matches() {
        let stored = OneTimeToken::generate();
        let same = OneTimeToken::parse(stored.as_str()).unwrap();
        let other = OneTimeToken::generate();
        assert!(stored.matches(&same));
        assert!(!stored.matches(&other));
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = OneTimeToken::generate();
        assert!(!format!("{token:?}").contains(token.as_str()));
    }
}
