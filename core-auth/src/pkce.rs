//! PKCE verifier/challenge pairs and per-request random values.

use crate::error::{AuthError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const MIN_ENTROPY_BYTES: usize = 32;
pub const MAX_ENTROPY_BYTES: usize = 96;
pub const DEFAULT_ENTROPY_BYTES: usize = 64;

/// Only `S256` is produced; SHA-256 is always available.
pub const CHALLENGE_METHOD: &str = "S256";

/// A code verifier held for exactly one authorization attempt.
pub struct PkceVerifier {
    verifier: String,
}

impl PkceVerifier {
    /// Generate a verifier from `entropy_bytes` random bytes.
    ///
    /// Fails with `InvalidPkceLength` outside `32..=96`.
    pub fn generate(entropy_bytes: usize) -> Result<Self> {
        if !(MIN_ENTROPY_BYTES..=MAX_ENTROPY_BYTES).contains(&entropy_bytes) {
            return Err(AuthError::InvalidPkceLength(entropy_bytes));
        }

        let mut bytes = vec![0u8; entropy_bytes];
        rand::thread_rng().fill_bytes(&mut bytes);

        Ok(Self {
            verifier: URL_SAFE_NO_PAD.encode(bytes),
        })
    }

    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        Self {
            verifier: verifier.into(),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// BASE64URL(SHA256(verifier))
    pub fn challenge(&self) -> String {
        derive_challenge(&self.verifier)
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .finish()
    }
}

pub fn derive_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// 16 random bytes, base64url without padding. Used for `state` and `nonce`.
pub fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_challenge_vector() {
        let verifier = PkceVerifier::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_verifier_length_follows_entropy() {
        // 4 output chars per 3 input bytes, no padding
        let verifier = PkceVerifier::generate(DEFAULT_ENTROPY_BYTES).unwrap();
        assert_eq!(verifier.verifier().len(), 86);

        let verifier = PkceVerifier::generate(MIN_ENTROPY_BYTES).unwrap();
        assert_eq!(verifier.verifier().len(), 43);

        let verifier = PkceVerifier::generate(MAX_ENTROPY_BYTES).unwrap();
        assert_eq!(verifier.verifier().len(), 128);
    }

    #[test]
    fn test_entropy_out_of_range() {
        assert!(matches!(
            PkceVerifier::generate(31),
            Err(AuthError::InvalidPkceLength(31))
        ));
        assert!(matches!(
            PkceVerifier::generate(97),
            Err(AuthError::InvalidPkceLength(97))
        ));
    }

    #[test]
    fn test_verifiers_are_unique_and_url_safe() {
        let first = PkceVerifier::generate(64).unwrap();
        let second = PkceVerifier::generate(64).unwrap();
        assert_ne!(first.verifier(), second.verifier());
        assert!(first
            .verifier()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_random_token_shape() {
        let state = random_token();
        assert_eq!(state.len(), 22);
        assert_ne!(state, random_token());
    }

    #[test]
    fn test_debug_redacts_verifier() {
        let verifier = PkceVerifier::from_verifier("super-secret-verifier");
        assert!(!format!("{:?}", verifier).contains("super-secret"));
    }
}
