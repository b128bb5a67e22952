use std::path::Path;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::ProtocolError;

/// Hex-encoded Ed25519 verifying key identifying a network participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PublicKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The local participant: a signing keypair plus its public identity.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    public_key: PublicKey,
}

impl Identity {
    pub fn generate() -> Self {
        Self::from_signing_key(crypto::generate_keypair())
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey::new(crypto::public_key_hex(&signing_key.verifying_key()));
        Self {
            signing_key,
            public_key,
        }
    }

    /// Load the persisted identity at `path`, creating it on first use.
    pub fn load_or_create(path: &Path) -> Result<Self, ProtocolError> {
        crypto::load_or_create_keypair(path).map(Self::from_signing_key)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Hex Ed25519 signature over `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(crypto::sign_message(&self.signing_key, payload).to_bytes())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_verifies_against_public_key() {
        let identity = Identity::generate();
        let sig = identity.sign(b"coordinate");
        assert!(crypto::verify_hex_signature(identity.public_key().as_str(), b"coordinate", &sig).is_ok());
    }

    #[test]
    fn test_public_key_normalized_lowercase() {
        assert_eq!(PublicKey::new("ABCDEF").as_str(), "abcdef");
    }

    #[test]
    fn test_debug_hides_secret() {
        let identity = Identity::generate();
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("public_key"));
        assert!(!rendered.contains("signing_key"));
    }
}
