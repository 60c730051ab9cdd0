//! Refresh token secrets and their stored comparison values.
//!
//! The raw secret exists only in the response that issues it. The store keeps
//! the SHA-256 hex digest, which is what lookups and comparisons use.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Entropy per secret. 256 bits makes collisions negligible without checking.
pub const SECRET_BYTES: usize = 32;

/// A bearer secret. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RefreshSecret(String);

impl RefreshSecret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RefreshSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshSecret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedToken {
    pub secret: RefreshSecret,
    pub hash: String,
}

/// Generate a fresh secret from the OS CSPRNG together with its hash.
pub fn generate() -> GeneratedToken {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let secret = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_token(&secret);

    GeneratedToken {
        secret: RefreshSecret(secret),
        hash,
    }
}

/// SHA-256 of the secret, lowercase hex.
pub fn hash_token(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a presented secret against a stored hash.
pub fn compare(secret: &str, stored_hash: &str) -> bool {
    constant_time_compare(&hash_token(secret), stored_hash)
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_produces_matching_hash() {
        let token = generate();
        assert_eq!(token.hash, hash_token(token.secret.expose()));
        assert!(compare(token.secret.expose(), &token.hash));
        assert_eq!(token.hash.len(), 64);
    }

    #[test]
    fn test_secret_has_full_entropy_length() {
        let token = generate();
        let decoded = URL_SAFE_NO_PAD.decode(token.secret.expose()).unwrap();
        assert_eq!(decoded.len(), SECRET_BYTES);
    }

    #[test]
    fn test_secrets_do_not_repeat() {
        let secrets: HashSet<String> = (0..1000)
            .map(|_| generate().secret.expose().to_string())
            .collect();
        assert_eq!(secrets.len(), 1000);
    }

    #[test]
    fn test_compare_rejects_other_secret() {
        let token = generate();
        let other = generate();
        assert!(!compare(other.secret.expose(), &token.hash));
        assert!(!compare(token.secret.expose(), "short"));
    }

    #[test]
    fn test_hash_token() {
        let hash1 = hash_token("some-refresh-secret");
        let hash2 = hash_token("some-refresh-secret");
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash_token("different-secret"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let token = generate();
        let printed = format!("{:?}", token);
        assert!(!printed.contains(token.secret.expose()));
        assert!(printed.contains("RefreshSecret(***)"));
    }
}
