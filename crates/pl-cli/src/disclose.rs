//! Disclosure of encrypted parameters in rendered templates.
//!
//! Sanitized views carry encrypted values as `{identifier:[seq:]base64}`
//! tokens. Given the matching key material each token is replaced by its
//! plaintext; tokens that cannot be opened stay in place.

use pl_redact::{EncryptedToken, KeyEscrow, RecipientSecret, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Default identifier of symmetric tokens.
pub const DEFAULT_SYMMETRIC_ID: &str = "sym";
/// Default identifier of asymmetric tokens.
pub const DEFAULT_ASYMMETRIC_ID: &str = "asym";

/// Key material used to open encrypted tokens.
pub struct DisclosureKeys {
    pub recipient: Option<RecipientSecret>,
    /// Escrow documents, tried in order.
    pub escrows: Vec<KeyEscrow>,
    pub symmetric_id: String,
    pub asymmetric_id: String,
    pub rotate_iv: bool,
}

impl Default for DisclosureKeys {
    fn default() -> Self {
        Self {
            recipient: None,
            escrows: Vec::new(),
            symmetric_id: DEFAULT_SYMMETRIC_ID.to_string(),
            asymmetric_id: DEFAULT_ASYMMETRIC_ID.to_string(),
            rotate_iv: false,
        }
    }
}

/// Outcome of [`DisclosureKeys::disclose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disclosed {
    pub text: String,
    pub decrypted: usize,
    pub failed: usize,
}

impl DisclosureKeys {
    pub fn is_empty(&self) -> bool {
        self.recipient.is_none() && self.escrows.is_empty()
    }

    /// Replace every token in `text` that these keys can open.
    pub fn disclose(&self, text: &str) -> Disclosed {
        let mut out = String::with_capacity(text.len());
        let mut cur_pos = 0;
        let mut decrypted = 0;
        let mut failed = 0;

        for (range, token) in EncryptedToken::find_all(text) {
            out.push_str(&text[cur_pos..range.start]);
            cur_pos = range.end;

            match self.open(&token) {
                Some(Ok(plain)) => {
                    out.push_str(&plain);
                    decrypted += 1;
                }
                Some(Err(reason)) => {
                    warn!(identifier = %token.identifier, sequence = ?token.sequence, %reason, "Failed to disclose value");
                    out.push_str(&text[range]);
                    failed += 1;
                }
                None => {
                    debug!(identifier = %token.identifier, "No key for token");
                    out.push_str(&text[range]);
                }
            }
        }
        out.push_str(&text[cur_pos..]);

        Disclosed {
            text: out,
            decrypted,
            failed,
        }
    }

    /// `None` when no key applies to the token's identifier.
    fn open(&self, token: &EncryptedToken) -> Option<std::result::Result<String, String>> {
        let plain = if token.identifier == self.asymmetric_id {
            let secret = self.recipient.as_ref()?;
            secret.open(&token.ciphertext).map_err(|e| e.to_string())
        } else if token.identifier == self.symmetric_id {
            if self.escrows.is_empty() {
                return None;
            }
            self.escrows
                .iter()
                .find_map(|escrow| escrow.decrypt(token, self.rotate_iv).ok())
                .ok_or_else(|| "no escrowed key opens this value".to_string())
        } else {
            return None;
        };
        Some(plain.and_then(|bytes| {
            String::from_utf8(bytes).map_err(|_| "plaintext is not UTF-8".to_string())
        }))
    }
}

/// Read every escrow document in `path`.
///
/// Escrow files are appended to on every start, so a file may hold several
/// documents. With `secret` set the file holds sealed documents, one base64
/// blob per paragraph.
pub fn load_escrows(path: &Path, secret: Option<&RecipientSecret>) -> Result<Vec<KeyEscrow>> {
    let content = std::fs::read_to_string(path)?;
    match secret {
        Some(secret) => content
            .split("\n\n")
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| KeyEscrow::open(chunk, secret))
            .collect(),
        None => split_plain_documents(&content)
            .into_iter()
            .map(KeyEscrow::parse)
            .collect(),
    }
}

fn split_plain_documents(content: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_start().starts_with("Starting Date") {
            if let Some(s) = start {
                docs.push(&content[s..offset]);
            }
            start = Some(offset);
        }
        offset += line.len();
    }
    if let Some(s) = start {
        docs.push(&content[s..]);
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_redact::{
        AsymmetricEncryptionFactory, ParamSanitizerRegistry, PrivacyRecord,
        SymmetricEncryptionFactory,
    };

    fn escrow(key: u8) -> KeyEscrow {
        KeyEscrow {
            starting_date: "2026-01-01T00:00:00.000Z".to_string(),
            secret_key: Some(vec![key; 32].into()),
            init_vector: Some(vec![1u8; 12]),
        }
    }

    #[test]
    fn test_symmetric_and_asymmetric_tokens_disclosed() {
        let secret = RecipientSecret::generate();
        let mut registry = ParamSanitizerRegistry::new();
        registry
            .register(
                "card",
                SymmetricEncryptionFactory::new()
                    .with_key(&[3u8; 32])
                    .with_iv(&[1u8; 12]),
            )
            .unwrap();
        registry
            .register(
                "ip",
                AsymmetricEncryptionFactory::new().with_recipient(secret.public_key()),
            )
            .unwrap();

        let record = PrivacyRecord::build(
            &registry,
            "{card} from {ip}",
            vec!["4111".into(), "10.0.0.1".into()],
        );
        let keys = DisclosureKeys {
            recipient: Some(secret),
            escrows: vec![escrow(9), escrow(3)],
            ..DisclosureKeys::default()
        };

        let disclosed = keys.disclose(record.sanitized_message().unwrap());
        assert_eq!(disclosed.text, "4111 from 10.0.0.1");
        assert_eq!(disclosed.decrypted, 2);
        assert_eq!(disclosed.failed, 0);
    }

    #[test]
    fn test_unknown_identifier_left_alone() {
        let keys = DisclosureKeys {
            escrows: vec![escrow(3)],
            ..DisclosureKeys::default()
        };
        let disclosed = keys.disclose("value {other:AAAA} end");
        assert_eq!(disclosed.text, "value {other:AAAA} end");
        assert_eq!(disclosed.decrypted + disclosed.failed, 0);
    }

    #[test]
    fn test_wrong_key_counts_failure() {
        let keys = DisclosureKeys {
            escrows: vec![escrow(3)],
            ..DisclosureKeys::default()
        };
        let disclosed = keys.disclose("x {sym:AAAAAAAAAAAAAAAAAAAAAAAA} y");
        assert_eq!(disclosed.failed, 1);
        assert_eq!(disclosed.text, "x {sym:AAAAAAAAAAAAAAAAAAAAAAAA} y");
    }

    #[test]
    fn test_load_appended_escrow_files() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("escrow.txt");
        let doc = format!("{}{}", escrow(1).to_document(), escrow(2).to_document());
        std::fs::write(&plain, doc).unwrap();
        let loaded = load_escrows(&plain, None).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].secret_key.as_deref(), Some(&vec![2u8; 32]));

        let secret = RecipientSecret::generate();
        let sealed_path = dir.path().join("escrow.sealed");
        let b64 = &base64::engine::general_purpose::STANDARD;
        let mut sealed = String::new();
        for key in [4u8, 5] {
            let blob = secret
                .public_key()
                .seal(escrow(key).to_document().as_bytes())
                .unwrap();
            sealed.push_str(&base64::Engine::encode(b64, blob));
            sealed.push_str("\n\n");
        }
        std::fs::write(&sealed_path, sealed).unwrap();
        let loaded = load_escrows(&sealed_path, Some(&secret)).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].secret_key.as_deref(), Some(&vec![4u8; 32]));
    }
}
