//! Sealing data to a recipient's P-256 public key.
//!
//! ECIES construction: an ephemeral ECDH key agreement, SHA-256 over the
//! shared secret and the ephemeral public key as KDF, and AES-256-GCM.
//!
//! Sealed layout: `ephemeral public key (33, SEC1 compressed) || nonce (12) || ciphertext`.

use crate::error::{RedactionError, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const KDF_LABEL: &[u8] = b"privlog-ecies-v1";
const EPHEMERAL_LEN: usize = 33;
const NONCE_LEN: usize = 12;

/// Public key of a party that may read sealed data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipientKey {
    key: PublicKey,
}

impl RecipientKey {
    /// Decode a SEC1-encoded public key.
    pub fn from_sec1(bytes: &[u8]) -> Result<Self> {
        let key = PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| RedactionError::Key(format!("invalid recipient key: {}", e)))?;
        Ok(Self { key })
    }

    /// Decode a base64 SEC1-encoded public key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| RedactionError::Key(format!("invalid base64: {}", e)))?;
        Self::from_sec1(&bytes)
    }

    /// SEC1 compressed encoding.
    pub fn to_sec1(&self) -> Vec<u8> {
        self.key.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Base64 of the SEC1 compressed encoding.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_sec1())
    }

    /// Seal `plaintext` so only the holder of the matching secret can open it.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let ephemeral = EphemeralSecret::random(&mut OsRng);
        let ephemeral_public = ephemeral.public_key().to_encoded_point(true);
        let shared = ephemeral.diffie_hellman(&self.key);
        let key = derive_key(shared.raw_secret_bytes(), ephemeral_public.as_bytes());

        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| RedactionError::Key(format!("invalid derived key: {}", e)))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| RedactionError::Key(format!("sealing failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(EPHEMERAL_LEN + NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(ephemeral_public.as_bytes());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }
}

impl From<PublicKey> for RecipientKey {
    fn from(key: PublicKey) -> Self {
        Self { key }
    }
}

/// Secret half of a recipient key pair.
#[derive(Clone)]
pub struct RecipientSecret {
    secret: SecretKey,
}

impl RecipientSecret {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Decode a raw 32-byte scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| RedactionError::Key(format!("invalid recipient secret: {}", e)))?;
        Ok(Self { secret })
    }

    /// Decode a base64 raw scalar.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| RedactionError::Key(format!("invalid base64: {}", e)))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Base64 of the raw scalar.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.secret.to_bytes())
    }

    /// The matching public key.
    pub fn public_key(&self) -> RecipientKey {
        RecipientKey {
            key: self.secret.public_key(),
        }
    }

    /// Open data produced by [`RecipientKey::seal`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < EPHEMERAL_LEN + NONCE_LEN {
            return Err(RedactionError::Key("sealed data too short".to_string()));
        }
        let (ephemeral_bytes, rest) = sealed.split_at(EPHEMERAL_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let ephemeral = PublicKey::from_sec1_bytes(ephemeral_bytes)
            .map_err(|e| RedactionError::Key(format!("invalid ephemeral key: {}", e)))?;
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), ephemeral.as_affine());
        let key = derive_key(shared.raw_secret_bytes(), ephemeral_bytes);

        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| RedactionError::Key(format!("invalid derived key: {}", e)))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| RedactionError::Key("failed to open sealed data".to_string()))
    }
}

impl std::fmt::Debug for RecipientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientSecret")
            .field("public_key", &self.public_key().to_base64())
            .finish()
    }
}

fn derive_key(shared: &[u8], ephemeral_public: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut hasher = Sha256::new();
    hasher.update(KDF_LABEL);
    hasher.update(shared);
    hasher.update(ephemeral_public);
    Zeroizing::new(hasher.finalize().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let secret = RecipientSecret::generate();
        let sealed = secret.public_key().seal(b"alice@example.com").unwrap();
        assert_eq!(secret.open(&sealed).unwrap(), b"alice@example.com");
    }

    #[test]
    fn test_sealing_is_randomized() {
        let secret = RecipientSecret::generate();
        let key = secret.public_key();
        assert_ne!(key.seal(b"same").unwrap(), key.seal(b"same").unwrap());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let secret = RecipientSecret::generate();
        let other = RecipientSecret::generate();
        let sealed = secret.public_key().seal(b"data").unwrap();
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn test_truncated_input_rejected() {
        let secret = RecipientSecret::generate();
        assert!(secret.open(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_key_encoding_roundtrip() {
        let secret = RecipientSecret::generate();
        let restored = RecipientSecret::from_base64(&secret.to_base64()).unwrap();
        assert_eq!(secret.public_key(), restored.public_key());

        let public = RecipientKey::from_base64(&secret.public_key().to_base64()).unwrap();
        assert_eq!(public, secret.public_key());
        assert_eq!(public.to_sec1().len(), 33);
    }
}
