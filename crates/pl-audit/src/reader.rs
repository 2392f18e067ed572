//! Template stream reader with signature verification.

use crate::template::SignedTemplate;
use crate::{AuditError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;
use tracing::{debug, info, warn};

/// Reads signed templates from a JSON-lines stream.
///
/// Blank lines are skipped. A malformed line yields [`AuditError::Parse`]
/// with its 1-based line number.
pub struct TemplateReader<R: BufRead> {
    input: R,
    line: usize,
    buf: String,
}

impl TemplateReader<BufReader<File>> {
    /// Open a template stream from a file path.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        debug!(path = %path.display(), "Opened template stream");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl TemplateReader<Cursor<Vec<u8>>> {
    /// Read templates from bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Cursor::new(bytes))
    }
}

impl<R: BufRead> TemplateReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: 0,
            buf: String::new(),
        }
    }

    /// Read every remaining template without checking signatures.
    pub fn read_all(self) -> Result<Vec<SignedTemplate>> {
        self.collect()
    }

    /// Read every remaining template, checking each signature.
    ///
    /// With `trusted_signer` set, every template must also be signed by that
    /// key (base64 SEC1).
    pub fn read_verified(self, trusted_signer: Option<&str>) -> Result<Vec<SignedTemplate>> {
        let mut verified = Vec::new();
        for template in self {
            let template = template?;
            let outcome = match trusted_signer {
                Some(signer) => template.verify_signed_by(signer),
                None => template.verify(),
            };
            if let Err(e) = outcome {
                warn!(template_id = template.id(), error = %e, "Template verification failed");
                return Err(e);
            }
            verified.push(template);
        }
        info!(templates = verified.len(), "Template stream verified");
        Ok(verified)
    }
}

impl<R: BufRead> Iterator for TemplateReader<R> {
    type Item = Result<SignedTemplate>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.input.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line += 1;

            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(text).map_err(|source| AuditError::Parse {
                    line: self.line,
                    source,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::SigningIdentity;
    use crate::template::{Entry, Template, TEMPLATE_NAME_PREFIX};
    use crate::writer::TemplateWriter;

    fn stream(identity: &SigningIdentity, count: u64) -> Vec<u8> {
        let mut writer = TemplateWriter::new(Vec::new());
        for id in 0..count {
            let mut t = Template::new(id, TEMPLATE_NAME_PREFIX);
            t.push(Entry::exchangeable("alice", "*****"));
            writer.write(&t.sign(identity, &[]).unwrap()).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn test_reads_back_written_templates() {
        let identity = SigningIdentity::generate();
        let mut bytes = stream(&identity, 3);
        bytes.extend_from_slice(b"\n\n");

        let templates = TemplateReader::from_bytes(bytes)
            .read_verified(Some(&identity.public_key_base64()))
            .unwrap();
        let ids: Vec<u64> = templates.iter().map(SignedTemplate::id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let identity = SigningIdentity::generate();
        let mut bytes = stream(&identity, 1);
        bytes.extend_from_slice(b"\n{not json}\n");

        let err = TemplateReader::from_bytes(bytes).read_all().unwrap_err();
        assert!(matches!(err, AuditError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_tampered_stream_fails_verification() {
        let identity = SigningIdentity::generate();
        let text = String::from_utf8(stream(&identity, 2))
            .unwrap()
            .replacen("alice", "bob", 1);

        let err = TemplateReader::from_bytes(text.into_bytes())
            .read_verified(None)
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidSignature { template_id: 0 }));
    }
}
