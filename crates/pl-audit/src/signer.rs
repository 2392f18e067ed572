//! Template signing keys.
//!
//! Templates are signed with ECDSA over P-256 and SHA-256. Signatures are DER
//! encoded; public keys are SEC1 compressed. Both travel as base64.

use crate::{AuditError, Result};
use base64::Engine;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};

/// Algorithm identifier recorded in every signature block.
pub const SIGNATURE_ALGORITHM: &str = "ecdsa-p256-sha256";

/// The key that signs templates, plus an optional certificate vouching for it.
#[derive(Clone)]
pub struct SigningIdentity {
    key: SigningKey,
    certificate: Option<Vec<u8>>,
}

impl SigningIdentity {
    /// Generate a fresh signing key.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::random(&mut rand::rngs::OsRng),
            certificate: None,
        }
    }

    /// Decode a raw 32-byte secret scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(bytes)
            .map_err(|e| AuditError::Signing(format!("invalid signing key: {}", e)))?;
        Ok(Self {
            key,
            certificate: None,
        })
    }

    /// Decode a base64 raw secret scalar.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuditError::Signing(format!("invalid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Base64 of the raw secret scalar.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.key.to_bytes())
    }

    /// Attach an opaque certificate (for example DER X.509) to every signature.
    pub fn with_certificate(mut self, certificate: Vec<u8>) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn certificate(&self) -> Option<&[u8]> {
        self.certificate.as_deref()
    }

    /// SEC1 compressed public key.
    pub fn public_key(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn public_key_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.public_key())
    }

    /// DER signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public_key", &self.public_key_base64())
            .field("certificate", &self.certificate.is_some())
            .finish()
    }
}

/// Check a DER `signature` over `message` against a SEC1 public key.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| AuditError::Signing(format!("invalid signer key: {}", e)))?;
    let signature = match Signature::from_der(signature) {
        Ok(sig) => sig,
        Err(_) => return Ok(false),
    };
    Ok(key.verify(message, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let identity = SigningIdentity::generate();
        let sig = identity.sign(b"template bytes");
        assert!(verify_signature(&identity.public_key(), b"template bytes", &sig).unwrap());
        assert!(!verify_signature(&identity.public_key(), b"tampered", &sig).unwrap());
    }

    #[test]
    fn test_wrong_key_rejects() {
        let a = SigningIdentity::generate();
        let b = SigningIdentity::generate();
        let sig = a.sign(b"x");
        assert!(!verify_signature(&b.public_key(), b"x", &sig).unwrap());
    }

    #[test]
    fn test_garbage_signature_is_invalid_not_error() {
        let a = SigningIdentity::generate();
        assert!(!verify_signature(&a.public_key(), b"x", b"not der").unwrap());
        assert!(verify_signature(b"bad key", b"x", b"sig").is_err());
    }

    #[test]
    fn test_base64_roundtrip() {
        let a = SigningIdentity::generate();
        let b = SigningIdentity::from_base64(&a.to_base64()).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.public_key().len(), 33);
    }

    #[test]
    fn test_debug_hides_secret() {
        let a = SigningIdentity::generate().with_certificate(vec![1, 2, 3]);
        let dbg = format!("{:?}", a);
        assert!(!dbg.contains(&a.to_base64()));
        assert_eq!(a.certificate(), Some(&[1u8, 2, 3][..]));
    }
}
