//! AES-256-GCM encrypting sanitizer.
//!
//! With IV rotation enabled the 12-byte IV is treated as a big-endian counter
//! and advanced after every encryption, so the IV used for the token with
//! sequence number `n` is the starting IV advanced by `n`. Without rotation
//! every token gets a fresh random nonce, carried in front of the ciphertext
//! (`nonce (12) || ct`); the configured IV is not used for those tokens.
//!
//! Key material that is not configured is generated at start and written to
//! the key escrow sink as a small text document:
//!
//! ```text
//! Starting Date: 2024-01-01T00:00:00.000Z
//! Secret Key: <base64>
//! InitVector: <base64>
//! ```
//!
//! When an escrow recipient is configured the document is sealed to it and
//! written as one base64 line followed by a blank line.

use super::encrypting::{EncryptedToken, EncryptingSanitizer, Encryptor, SealEngine};
use super::{Lifecycle, ParamSanitizer, SanitizerFactory};
use crate::error::{RedactionError, Result};
use crate::placeholder::Placeholder;
use crate::seal::{RecipientKey, RecipientSecret};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use std::io::Write;
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// GCM IV length in bytes.
pub const IV_LEN: usize = 12;

const STARTING_DATE: &str = "Starting Date";
const SECRET_KEY: &str = "Secret Key";
const INIT_VECTOR: &str = "InitVector";

/// Add `steps` to `iv`, read as a big-endian unsigned integer, wrapping.
pub fn advance_iv(iv: &mut [u8], steps: u64) {
    let mut carry = steps as u128;
    for byte in iv.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = *byte as u128 + (carry & 0xff);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
}

/// Decrypt one ciphertext produced with an explicit IV (rotating mode).
pub fn decrypt_symmetric(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != IV_LEN {
        return Err(RedactionError::Key(format!(
            "IV must be {} bytes, got {}",
            IV_LEN,
            iv.len()
        )));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| RedactionError::Key(format!("key must be {} bytes", KEY_LEN)))?;
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| RedactionError::Key("decryption failed".to_string()))
}

/// Decrypt `nonce || ciphertext` as produced without IV rotation.
pub fn decrypt_prefixed(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < IV_LEN {
        return Err(RedactionError::Key("ciphertext shorter than its nonce".to_string()));
    }
    let (nonce, ciphertext) = sealed.split_at(IV_LEN);
    decrypt_symmetric(key, nonce, ciphertext)
}

struct CipherState {
    cipher: Aes256Gcm,
    iv: [u8; IV_LEN],
    sequence: u64,
}

struct SymmetricEngine {
    state: Mutex<CipherState>,
    rotate_iv: bool,
}

impl SealEngine for SymmetricEngine {
    fn seal(&self, plaintext: &[u8]) -> std::result::Result<(u64, Vec<u8>), String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| "cipher state lock poisoned".to_string())?;
        let sealed = if self.rotate_iv {
            let ciphertext = state
                .cipher
                .encrypt(Nonce::from_slice(&state.iv), plaintext)
                .map_err(|e| e.to_string())?;
            advance_iv(&mut state.iv, 1);
            ciphertext
        } else {
            let mut nonce = [0u8; IV_LEN];
            getrandom::getrandom(&mut nonce).map_err(|e| e.to_string())?;
            let ciphertext = state
                .cipher
                .encrypt(Nonce::from_slice(&nonce), plaintext)
                .map_err(|e| e.to_string())?;
            let mut sealed = Vec::with_capacity(IV_LEN + ciphertext.len());
            sealed.extend_from_slice(&nonce);
            sealed.extend_from_slice(&ciphertext);
            sealed
        };
        let sequence = state.sequence;
        state.sequence += 1;
        Ok((sequence, sealed))
    }
}

/// Key material recovered from a key escrow document.
#[derive(Clone)]
pub struct KeyEscrow {
    pub starting_date: String,
    pub secret_key: Option<Zeroizing<Vec<u8>>>,
    pub init_vector: Option<Vec<u8>>,
}

impl KeyEscrow {
    /// Render the escrow document.
    pub fn to_document(&self) -> String {
        let b64 = &base64::engine::general_purpose::STANDARD;
        let mut doc = format!("{}: {}\n", STARTING_DATE, self.starting_date);
        if let Some(ref key) = self.secret_key {
            doc.push_str(&format!("{}: {}\n", SECRET_KEY, b64.encode(key.as_slice())));
        }
        if let Some(ref iv) = self.init_vector {
            doc.push_str(&format!("{}: {}\n", INIT_VECTOR, b64.encode(iv)));
        }
        doc
    }

    /// Parse a plain escrow document.
    pub fn parse(document: &str) -> Result<Self> {
        let b64 = &base64::engine::general_purpose::STANDARD;
        let mut starting_date = None;
        let mut secret_key = None;
        let mut init_vector = None;

        for line in document.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some((name, value)) = line.split_once(':') else {
                return Err(RedactionError::Key(format!("malformed escrow line: {}", line)));
            };
            let value = value.trim();
            match name.trim() {
                STARTING_DATE => starting_date = Some(value.to_string()),
                SECRET_KEY => {
                    let key = b64
                        .decode(value)
                        .map_err(|e| RedactionError::Key(format!("invalid secret key: {}", e)))?;
                    secret_key = Some(Zeroizing::new(key));
                }
                INIT_VECTOR => {
                    init_vector = Some(
                        b64.decode(value)
                            .map_err(|e| RedactionError::Key(format!("invalid IV: {}", e)))?,
                    );
                }
                other => {
                    return Err(RedactionError::Key(format!("unknown escrow field: {}", other)))
                }
            }
        }

        Ok(Self {
            starting_date: starting_date
                .ok_or_else(|| RedactionError::Key("escrow document has no starting date".into()))?,
            secret_key,
            init_vector,
        })
    }

    /// Open a sealed escrow document (the base64 line) with `secret`.
    pub fn open(sealed: &str, secret: &RecipientSecret) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(sealed.trim())
            .map_err(|e| RedactionError::Key(format!("invalid base64: {}", e)))?;
        let plain = Zeroizing::new(secret.open(&bytes)?);
        let doc = std::str::from_utf8(&plain)
            .map_err(|_| RedactionError::Key("escrow document is not UTF-8".to_string()))?;
        Self::parse(doc)
    }

    /// Decrypt `token` with the escrowed key.
    ///
    /// With `rotate_iv` the escrowed IV is advanced by the token's sequence
    /// number, which must be present. Otherwise the nonce is read from the
    /// front of the ciphertext.
    pub fn decrypt(&self, token: &EncryptedToken, rotate_iv: bool) -> Result<Vec<u8>> {
        let key = self
            .secret_key
            .as_ref()
            .ok_or_else(|| RedactionError::Key("escrow has no secret key".to_string()))?;
        if !rotate_iv {
            return decrypt_prefixed(key, &token.ciphertext);
        }
        let mut iv = self
            .init_vector
            .clone()
            .ok_or_else(|| RedactionError::Key("escrow has no IV".to_string()))?;
        let sequence = token.sequence.ok_or_else(|| {
            RedactionError::Key("rotating IV requires sequence numbers".to_string())
        })?;
        advance_iv(&mut iv, sequence);
        decrypt_symmetric(key, &iv, &token.ciphertext)
    }
}

impl std::fmt::Debug for KeyEscrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyEscrow")
            .field("starting_date", &self.starting_date)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("init_vector", &self.init_vector.as_ref().map(hex::encode))
            .finish()
    }
}

/// Factory for AES-256-GCM encrypting sanitizers.
pub struct SymmetricEncryptionFactory {
    identifier: String,
    show_sequence: bool,
    encrypt_critical: bool,
    rotate_iv: bool,
    key: Option<Zeroizing<Vec<u8>>>,
    iv: Option<Vec<u8>>,
    escrow_recipient: Option<RecipientKey>,
    escrow_sink: Mutex<Option<Box<dyn Write + Send>>>,
    encryptor: Option<Arc<Encryptor>>,
    lifecycle: Lifecycle,
}

impl Default for SymmetricEncryptionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SymmetricEncryptionFactory {
    pub fn new() -> Self {
        Self {
            identifier: "sym".to_string(),
            show_sequence: false,
            encrypt_critical: false,
            rotate_iv: false,
            key: None,
            iv: None,
            escrow_recipient: None,
            escrow_sink: Mutex::new(None),
            encryptor: None,
            lifecycle: Lifecycle::default(),
        }
    }

    /// Token identifier (default `sym`).
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Include the sequence number in every token.
    pub fn with_sequence_numbers(mut self, show: bool) -> Self {
        self.show_sequence = show;
        self
    }

    /// Replace the critical value by the token as well.
    pub fn with_encrypt_critical(mut self, encrypt_critical: bool) -> Self {
        self.encrypt_critical = encrypt_critical;
        self
    }

    /// Advance the IV after every encryption.
    pub fn with_rotate_iv(mut self, rotate_iv: bool) -> Self {
        self.rotate_iv = rotate_iv;
        self
    }

    /// Use a fixed key instead of generating one. Checked at start.
    pub fn with_key(mut self, key: &[u8]) -> Self {
        self.key = Some(Zeroizing::new(key.to_vec()));
        self
    }

    /// Use a fixed starting IV instead of generating one. Checked at start.
    /// Only rotating mode encrypts under it.
    pub fn with_iv(mut self, iv: &[u8]) -> Self {
        self.iv = Some(iv.to_vec());
        self
    }

    /// Seal generated key material to `recipient` before writing it.
    pub fn with_escrow_recipient(mut self, recipient: RecipientKey) -> Self {
        self.escrow_recipient = Some(recipient);
        self
    }

    /// Where generated key material is written (default stderr).
    pub fn with_escrow_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.escrow_sink = Mutex::new(Some(Box::new(sink)));
        self
    }

    /// Whether IV rotation is enabled.
    pub fn rotates_iv(&self) -> bool {
        self.rotate_iv
    }

    fn write_escrow(&mut self, escrow: &KeyEscrow) -> Result<()> {
        let document = Zeroizing::new(escrow.to_document());
        let payload = match self.escrow_recipient {
            Some(ref recipient) => {
                let sealed = recipient.seal(document.as_bytes())?;
                Zeroizing::new(format!(
                    "{}\n\n",
                    base64::engine::general_purpose::STANDARD.encode(sealed)
                ))
            }
            None => document,
        };

        let sink = self
            .escrow_sink
            .get_mut()
            .map_err(|_| RedactionError::Config("escrow sink lock poisoned".to_string()))?;
        match sink {
            Some(w) => {
                w.write_all(payload.as_bytes())?;
                w.flush()?;
            }
            None => {
                let mut stderr = std::io::stderr().lock();
                stderr.write_all(payload.as_bytes())?;
                stderr.flush()?;
            }
        }
        Ok(())
    }
}

impl SanitizerFactory for SymmetricEncryptionFactory {
    fn name(&self) -> &'static str {
        "symmetric encryption factory"
    }

    fn start(&mut self) -> Result<()> {
        let mut escrow = KeyEscrow {
            starting_date: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
            secret_key: None,
            init_vector: None,
        };

        let key = match self.key.clone() {
            Some(key) if key.len() == KEY_LEN => key,
            Some(key) => {
                return Err(RedactionError::Key(format!(
                    "key must be {} bytes, got {}",
                    KEY_LEN,
                    key.len()
                )))
            }
            None => {
                let key = random_bytes(KEY_LEN)?;
                escrow.secret_key = Some(key.clone());
                key
            }
        };

        let iv: [u8; IV_LEN] = match self.iv.clone() {
            Some(iv) => iv.as_slice().try_into().map_err(|_| {
                RedactionError::Key(format!("IV must be {} bytes, got {}", IV_LEN, iv.len()))
            })?,
            None => {
                let iv = random_bytes(IV_LEN)?;
                escrow.init_vector = Some(iv.to_vec());
                let mut fixed = [0u8; IV_LEN];
                fixed.copy_from_slice(&iv);
                fixed
            }
        };

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| RedactionError::Key(format!("failed to initialize cipher: {}", e)))?;

        if escrow.secret_key.is_some() || escrow.init_vector.is_some() {
            self.write_escrow(&escrow)?;
        }

        self.key = Some(key);
        self.iv = Some(iv.to_vec());
        self.encryptor = Some(Arc::new(Encryptor {
            identifier: self.identifier.clone(),
            show_sequence: self.show_sequence,
            encrypt_critical: self.encrypt_critical,
            engine: Box::new(SymmetricEngine {
                state: Mutex::new(CipherState {
                    cipher,
                    iv,
                    sequence: 0,
                }),
                rotate_iv: self.rotate_iv,
            }),
        }));
        self.lifecycle.mark_started();
        tracing::debug!(identifier = %self.identifier, rotate_iv = self.rotate_iv, "symmetric encryption started");
        Ok(())
    }

    fn stop(&self) {
        self.lifecycle.mark_stopped();
    }

    fn is_started(&self) -> bool {
        self.lifecycle.is_started()
    }

    fn create(
        &self,
        tag: &str,
        parameter: String,
        placeholder: Placeholder,
    ) -> Option<Box<dyn ParamSanitizer>> {
        if !self.lifecycle.check(self.name(), tag) {
            return None;
        }
        let encryptor = self.encryptor.clone()?;
        Some(Box::new(EncryptingSanitizer::new(
            tag,
            parameter,
            placeholder,
            encryptor,
        )))
    }
}

fn random_bytes(len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut buf = Zeroizing::new(vec![0u8; len]);
    getrandom::getrandom(buf.as_mut_slice())
        .map_err(|e| RedactionError::Key(format!("failed to generate random bytes: {}", e)))?;
    Ok(buf)
}
