use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::ProtocolError;

/// Generate a new Ed25519 keypair.
pub fn generate_keypair() -> SigningKey {
    let mut rng = rand::thread_rng();
    SigningKey::generate(&mut rng)
}

/// Lowercase hex of a verifying key; this is the participant's public identity.
pub fn public_key_hex(verifying_key: &VerifyingKey) -> String {
    hex::encode(verifying_key.as_bytes())
}

/// Sign a payload with the signing key.
pub fn sign_message(signing_key: &SigningKey, payload: &[u8]) -> Signature {
    signing_key.sign(payload)
}

/// Verify a signature against the verifying key.
pub fn verify_signature(
    verifying_key: &VerifyingKey,
    payload: &[u8],
    signature: &Signature,
) -> Result<(), ProtocolError> {
    verifying_key
        .verify(payload, signature)
        .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))
}

/// Verify a hex signature made by the hex public key over `payload`.
pub fn verify_hex_signature(
    public_key: &str,
    payload: &[u8],
    signature: &str,
) -> Result<(), ProtocolError> {
    let verifying_key = parse_verifying_key(public_key)?;
    let signature = parse_signature(signature)?;
    verify_signature(&verifying_key, payload, &signature)
}

/// Decode a 32-byte hex verifying key.
pub fn parse_verifying_key(public_key: &str) -> Result<VerifyingKey, ProtocolError> {
    let bytes = hex::decode(public_key)
        .map_err(|e| ProtocolError::Crypto(format!("invalid public key hex: {e}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ProtocolError::Crypto("public key wrong length".into()))?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|e| ProtocolError::Crypto(format!("invalid public key: {e}")))
}

/// Decode a 64-byte hex signature.
pub fn parse_signature(signature: &str) -> Result<Signature, ProtocolError> {
    let bytes = hex::decode(signature)
        .map_err(|e| ProtocolError::InvalidSignature(format!("invalid hex: {e}")))?;
    let arr: [u8; 64] = bytes
        .try_into()
        .map_err(|_| ProtocolError::InvalidSignature("signature wrong length".into()))?;
    Ok(Signature::from_bytes(&arr))
}

/// Compute SHA-256 hash of data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let hash = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    result
}

/// Load an Ed25519 keypair from a file, or create a new one if the file doesn't exist.
/// The file stores the raw 32-byte Ed25519 seed with mode 0600.
pub fn load_or_create_keypair(path: &Path) -> Result<SigningKey, ProtocolError> {
    if path.exists() {
        let seed_bytes = std::fs::read(path)
            .map_err(|e| ProtocolError::Crypto(format!("read key file: {e}")))?;
        let seed: [u8; 32] = seed_bytes.as_slice().try_into().map_err(|_| {
            ProtocolError::Crypto(format!(
                "key file is {} bytes, expected 32",
                seed_bytes.len()
            ))
        })?;
        Ok(SigningKey::from_bytes(&seed))
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProtocolError::Crypto(format!("create dir: {e}")))?;
        }
        let key = generate_keypair();
        std::fs::write(path, key.to_bytes())
            .map_err(|e| ProtocolError::Crypto(format!("write key file: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| ProtocolError::Crypto(format!("set permissions: {e}")))?;
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_hex_shape() {
        let key = generate_keypair();
        let pk = public_key_hex(&key.verifying_key());
        assert_eq!(pk.len(), 64);
        assert!(pk.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_sign_and_verify_hex() {
        let key = generate_keypair();
        let pk = public_key_hex(&key.verifying_key());
        let sig = hex::encode(sign_message(&key, b"hello relays").to_bytes());
        assert!(verify_hex_signature(&pk, b"hello relays", &sig).is_ok());
        assert!(verify_hex_signature(&pk, b"hello relay", &sig).is_err());
    }

    #[test]
    fn test_verify_with_other_key_fails() {
        let signer = generate_keypair();
        let other = public_key_hex(&generate_keypair().verifying_key());
        let sig = hex::encode(sign_message(&signer, b"payload").to_bytes());
        assert!(verify_hex_signature(&other, b"payload", &sig).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_lengths() {
        assert!(parse_verifying_key("abcd").is_err());
        assert!(parse_signature("abcd").is_err());
        assert!(parse_verifying_key("zz").is_err());
    }

    #[test]
    fn test_key_file_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("identity.key");
        let k1 = load_or_create_keypair(&path).unwrap();
        let k2 = load_or_create_keypair(&path).unwrap();
        assert_eq!(k1.to_bytes(), k2.to_bytes());
    }

    #[test]
    fn test_truncated_key_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");
        std::fs::write(&path, [1u8; 10]).unwrap();
        assert!(load_or_create_keypair(&path).is_err());
    }
}
