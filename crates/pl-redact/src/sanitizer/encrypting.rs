//! Shared machinery of the encrypting sanitizers.
//!
//! An encrypted parameter is rendered as a token
//! `{identifier:[sequence:]base64(ciphertext)}`. The sequence number is
//! factory-wide and assigned under the same lock that produces the
//! ciphertext, so the sequence order matches the encryption order.

use super::ParamSanitizer;
use crate::error::{RedactionError, Result};
use crate::placeholder::Placeholder;
use base64::Engine;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z0-9_.\-]+):(?:([0-9]+):)?([A-Za-z0-9+/]+={0,2})\}").unwrap()
});

/// Cipher backend of an encrypting factory.
pub(crate) trait SealEngine: Send + Sync {
    /// Encrypt `plaintext`, returning the sequence number assigned to it.
    fn seal(&self, plaintext: &[u8]) -> std::result::Result<(u64, Vec<u8>), String>;
}

/// Token formatting settings plus the cipher backend.
pub(crate) struct Encryptor {
    pub(crate) identifier: String,
    pub(crate) show_sequence: bool,
    pub(crate) encrypt_critical: bool,
    pub(crate) engine: Box<dyn SealEngine>,
}

impl Encryptor {
    fn token(&self, tag: &str, value: &str) -> Result<String> {
        let (sequence, ciphertext) = self
            .engine
            .seal(value.as_bytes())
            .map_err(|e| RedactionError::crypto(tag, e))?;
        let token = EncryptedToken {
            identifier: self.identifier.clone(),
            sequence: self.show_sequence.then_some(sequence),
            ciphertext,
        };
        Ok(token.to_string())
    }
}

/// Sanitizer produced by the symmetric and asymmetric encryption factories.
pub struct EncryptingSanitizer {
    placeholder: Placeholder,
    tag: String,
    value: String,
    encryptor: Arc<Encryptor>,
    sanitized: OnceCell<String>,
}

impl EncryptingSanitizer {
    pub(crate) fn new(
        tag: &str,
        value: String,
        placeholder: Placeholder,
        encryptor: Arc<Encryptor>,
    ) -> Self {
        Self {
            placeholder,
            tag: tag.to_string(),
            value,
            encryptor,
            sanitized: OnceCell::new(),
        }
    }
}

impl ParamSanitizer for EncryptingSanitizer {
    fn placeholder(&self) -> &Placeholder {
        &self.placeholder
    }

    fn critical(&self) -> Result<&str> {
        if self.encryptor.encrypt_critical {
            self.sanitized()
        } else {
            Ok(&self.value)
        }
    }

    fn sanitized(&self) -> Result<&str> {
        self.sanitized
            .get_or_try_init(|| self.encryptor.token(&self.tag, &self.value))
            .map(String::as_str)
    }

    fn critical_equals_sanitized(&self) -> Result<bool> {
        // A ciphertext never equals its plaintext; skip the encryption.
        Ok(self.encryptor.encrypt_critical)
    }
}

/// A parsed `{identifier:[sequence:]base64}` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedToken {
    pub identifier: String,
    pub sequence: Option<u64>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedToken {
    /// Parse a complete token.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = RE_TOKEN.captures(s)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != s.len() {
            return None;
        }
        Self::from_captures(&caps)
    }

    /// Find every token in `text`, with its byte range.
    pub fn find_all(text: &str) -> Vec<(Range<usize>, EncryptedToken)> {
        RE_TOKEN
            .captures_iter(text)
            .filter_map(|caps| {
                let range = caps.get(0)?.range();
                Self::from_captures(&caps).map(|t| (range, t))
            })
            .collect()
    }

    fn from_captures(caps: &regex::Captures<'_>) -> Option<Self> {
        let identifier = caps.get(1)?.as_str().to_string();
        let sequence = match caps.get(2) {
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(caps.get(3)?.as_str())
            .ok()?;
        Some(Self {
            identifier,
            sequence,
            ciphertext,
        })
    }
}

impl fmt::Display for EncryptedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}:", self.identifier)?;
        if let Some(seq) = self.sequence {
            write!(f, "{}:", seq)?;
        }
        write!(
            f,
            "{}}}",
            base64::engine::general_purpose::STANDARD.encode(&self.ciphertext)
        )
    }
}
