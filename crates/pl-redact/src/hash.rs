//! Digests and keyed MACs used by the blinding sanitizers.
//!
//! Blinded values are base64 encoded so they stay printable in log lines.

use crate::error::{RedactionError, Result};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

/// Minimum accepted MAC key length in bytes.
pub const MIN_MAC_KEY_BYTES: usize = 16;

/// Supported message digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Parse an algorithm name. Accepts `SHA-256`, `sha256`, `SHA256` and so on.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Some(DigestAlgorithm::Sha256),
            "sha384" => Some(DigestAlgorithm::Sha384),
            "sha512" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Digest `data` in one shot.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// Digest the concatenation of `parts`.
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }
        match self {
            DigestAlgorithm::Sha256 => run::<Sha256>(parts),
            DigestAlgorithm::Sha384 => run::<Sha384>(parts),
            DigestAlgorithm::Sha512 => run::<Sha512>(parts),
        }
    }

    /// Digest `data` and return it base64 encoded.
    pub fn digest_base64(&self, data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.digest(data))
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DigestAlgorithm::Sha256 => "sha-256",
            DigestAlgorithm::Sha384 => "sha-384",
            DigestAlgorithm::Sha512 => "sha-512",
        };
        write!(f, "{}", s)
    }
}

/// Key material for HMAC blinding.
#[derive(Clone)]
pub struct MacKey {
    /// The raw key bytes.
    key: Zeroizing<Vec<u8>>,
    /// Hash function underlying the HMAC.
    pub algorithm: DigestAlgorithm,
}

impl MacKey {
    /// Create new key material with a random 32-byte key.
    pub fn generate(algorithm: DigestAlgorithm) -> Result<Self> {
        let mut key = Zeroizing::new(vec![0u8; 32]);
        getrandom::getrandom(key.as_mut_slice()).map_err(|e| {
            RedactionError::Key(format!("failed to generate random key: {}", e))
        })?;
        Ok(Self { key, algorithm })
    }

    /// Create key material from raw bytes.
    pub fn from_bytes(key: &[u8], algorithm: DigestAlgorithm) -> Result<Self> {
        if key.len() < MIN_MAC_KEY_BYTES {
            return Err(RedactionError::Key(format!(
                "MAC key must be at least {} bytes, got {}",
                MIN_MAC_KEY_BYTES,
                key.len()
            )));
        }
        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
            algorithm,
        })
    }

    /// Create key material from a base64-encoded string.
    pub fn from_base64(encoded: &str, algorithm: DigestAlgorithm) -> Result<Self> {
        let decoded = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| RedactionError::Key(format!("invalid base64: {}", e)))?,
        );
        Self::from_bytes(&decoded, algorithm)
    }

    /// Export key material as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.key.as_slice())
    }

    /// Compute the HMAC of `input`, base64 encoded.
    pub fn mac_base64(&self, input: &[u8]) -> Result<String> {
        let tag = match self.algorithm {
            DigestAlgorithm::Sha256 => self.mac::<Hmac<Sha256>>(input)?,
            DigestAlgorithm::Sha384 => self.mac::<Hmac<Sha384>>(input)?,
            DigestAlgorithm::Sha512 => self.mac::<Hmac<Sha512>>(input)?,
        };
        Ok(base64::engine::general_purpose::STANDARD.encode(tag))
    }

    fn mac<M: Mac + hmac::digest::KeyInit>(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut mac = <M as Mac>::new_from_slice(&self.key)
            .map_err(|e| RedactionError::Key(format!("invalid MAC key: {}", e)))?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacKey")
            .field("algorithm", &self.algorithm)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
