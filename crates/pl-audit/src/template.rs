//! Audit templates.
//!
//! A template is an ordered list of entries covering a batch of log records:
//!
//! - `fixed`: text that may not be altered
//! - `exchangeable`: a critical value and its sanitized substitute; the
//!   signature covers both, so a rendered view of either one can be checked
//!   against the full template but the pair must be kept to verify it
//! - `blank`: free text the signer does not vouch for
//!
//! An open [`Template`] accepts entries. Signing consumes it and produces a
//! [`SignedTemplate`], which can no longer be extended.

use crate::signer::{verify_signature, SigningIdentity, SIGNATURE_ALGORITHM};
use crate::{AuditError, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use pl_redact::RecipientKey;
use serde::{Deserialize, Serialize};

/// Default template name prefix.
pub const TEMPLATE_NAME_PREFIX: &str = "Logging Template";

/// One template entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entry {
    Fixed { text: String },
    Exchangeable { critical: String, sanitized: String },
    Blank { text: String },
}

impl Entry {
    pub fn fixed(text: impl Into<String>) -> Self {
        Entry::Fixed { text: text.into() }
    }

    pub fn exchangeable(critical: impl Into<String>, sanitized: impl Into<String>) -> Self {
        Entry::Exchangeable {
            critical: critical.into(),
            sanitized: sanitized.into(),
        }
    }

    pub fn blank(text: impl Into<String>) -> Self {
        Entry::Blank { text: text.into() }
    }

    /// Text of this entry in the given view.
    pub fn text(&self, view: View) -> &str {
        match (self, view) {
            (Entry::Fixed { text }, _) | (Entry::Blank { text }, _) => text,
            (Entry::Exchangeable { critical, .. }, View::Critical) => critical,
            (Entry::Exchangeable { sanitized, .. }, View::Sanitized) => sanitized,
        }
    }
}

/// Which side of exchangeable values to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Critical,
    Sanitized,
}

/// An open template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: u64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<Entry>,
}

/// The signed part of a template.
#[derive(Serialize)]
struct Canonical<'a> {
    id: u64,
    name: &'a str,
    created_at: &'a DateTime<Utc>,
    entries: &'a [Entry],
}

impl Template {
    /// A new empty template named `"<prefix> <id>"`.
    pub fn new(id: u64, prefix: &str) -> Self {
        Self {
            id,
            name: format!("{} {}", prefix, id),
            created_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = Entry>) {
        self.entries.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_bytes(self.id, &self.name, &self.created_at, &self.entries)
    }

    /// Sign the template, naming `recipients` as the parties allowed to
    /// disclose exchangeable values.
    pub fn sign(
        self,
        identity: &SigningIdentity,
        recipients: &[RecipientKey],
    ) -> Result<SignedTemplate> {
        let b64 = &base64::engine::general_purpose::STANDARD;
        let signature = identity.sign(&self.canonical_bytes()?);
        Ok(SignedTemplate {
            signature: SignatureBlock {
                algorithm: SIGNATURE_ALGORITHM.to_string(),
                value: b64.encode(signature),
                signer: identity.public_key_base64(),
                certificate: identity.certificate().map(|c| b64.encode(c)),
                recipients: recipients.iter().map(RecipientKey::to_base64).collect(),
            },
            template: self,
        })
    }
}

fn canonical_bytes(
    id: u64,
    name: &str,
    created_at: &DateTime<Utc>,
    entries: &[Entry],
) -> Result<Vec<u8>> {
    let canonical = Canonical {
        id,
        name,
        created_at,
        entries,
    };
    Ok(serde_json::to_vec(&canonical)?)
}

/// Signature metadata attached to a signed template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub algorithm: String,
    /// Base64 DER signature.
    pub value: String,
    /// Base64 SEC1 public key of the signer.
    pub signer: String,
    /// Base64 opaque signer certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// Base64 SEC1 keys of the parties that may disclose exchangeable values.
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// A template closed by a signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTemplate {
    #[serde(flatten)]
    template: Template,
    pub signature: SignatureBlock,
}

impl SignedTemplate {
    pub fn id(&self) -> u64 {
        self.template.id
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.template.created_at
    }

    pub fn entries(&self) -> &[Entry] {
        &self.template.entries
    }

    /// Check the signature against the embedded signer key.
    pub fn verify(&self) -> Result<()> {
        if self.signature.algorithm != SIGNATURE_ALGORITHM {
            return Err(AuditError::Signing(format!(
                "unsupported signature algorithm {}",
                self.signature.algorithm
            )));
        }
        let b64 = &base64::engine::general_purpose::STANDARD;
        let signer = b64
            .decode(&self.signature.signer)
            .map_err(|e| AuditError::Signing(format!("invalid signer key encoding: {}", e)))?;
        let value = b64
            .decode(&self.signature.value)
            .map_err(|_| AuditError::InvalidSignature {
                template_id: self.id(),
            })?;

        if verify_signature(&signer, &self.template.canonical_bytes()?, &value)? {
            Ok(())
        } else {
            Err(AuditError::InvalidSignature {
                template_id: self.id(),
            })
        }
    }

    /// Check the signature and that it was made by `trusted_signer` (base64 SEC1).
    pub fn verify_signed_by(&self, trusted_signer: &str) -> Result<()> {
        self.verify()?;
        if self.signature.signer != trusted_signer.trim() {
            return Err(AuditError::Signing(format!(
                "template {} was signed by an untrusted key",
                self.id()
            )));
        }
        Ok(())
    }

    /// Render every entry in the given view.
    pub fn render(&self, view: View) -> String {
        self.template.entries.iter().map(|e| e.text(view)).collect()
    }

    pub fn render_critical(&self) -> String {
        self.render(View::Critical)
    }

    pub fn render_sanitized(&self) -> String {
        self.render(View::Sanitized)
    }
}
