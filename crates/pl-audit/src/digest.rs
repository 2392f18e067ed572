//! Chained line digests.
//!
//! Every rendered line gets a digest appended, ` [digest:<hex>]` by default.
//! In chained mode the digest covers the previous digest followed by the
//! line, so removing or reordering lines breaks the chain. The chain starts
//! from the digest of the empty input and can be resumed from the last line
//! of an existing log file.

use crate::{AuditError, Result};
use base64::Engine;
use pl_redact::DigestAlgorithm;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

pub const DEFAULT_DIGEST_PREFIX: &str = " [digest:";
pub const DEFAULT_DIGEST_SUFFIX: &str = "]";

/// Appends a (chained) digest to each line.
#[derive(Debug)]
pub struct DigestChain {
    algorithm: DigestAlgorithm,
    base64: bool,
    chained: bool,
    prefix: String,
    suffix: String,
    prev: Mutex<Vec<u8>>,
}

impl DigestChain {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            base64: false,
            chained: true,
            prefix: DEFAULT_DIGEST_PREFIX.to_string(),
            suffix: DEFAULT_DIGEST_SUFFIX.to_string(),
            prev: Mutex::new(algorithm.digest(b"")),
        }
    }

    /// Encode digests as base64 instead of lowercase hex.
    pub fn with_base64(mut self, base64: bool) -> Self {
        self.base64 = base64;
        self
    }

    /// Whether each digest covers the previous one.
    pub fn with_chained(mut self, chained: bool) -> Self {
        self.chained = chained;
        self
    }

    pub fn with_affixes(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.suffix = suffix.into();
        self
    }

    /// Continue the chain from the last digest found in `path`.
    ///
    /// An unreadable file or a last line without a digest starts a fresh
    /// chain with a warning. A digest that cannot be decoded is an error.
    pub fn resume_from_file(self, path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read log file; starting a new digest chain");
                return Ok(self);
            }
        };

        let mut last_line = None;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
        let Some(last_line) = last_line else {
            return Ok(self);
        };

        let class = if self.base64 {
            "([0-9a-zA-Z+/=]+)"
        } else {
            "([0-9a-f]+)"
        };
        let re = Regex::new(&format!(
            "{}{}{}",
            regex::escape(&self.prefix),
            class,
            regex::escape(&self.suffix)
        ))
        .map_err(|e| AuditError::Digest(e.to_string()))?;

        let Some(encoded) = re
            .captures_iter(&last_line)
            .last()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
        else {
            warn!(path = %path.display(), "No digest in last line of log file; starting a new digest chain");
            return Ok(self);
        };

        let prev = if self.base64 {
            base64::engine::general_purpose::STANDARD
                .decode(&encoded)
                .map_err(|e| AuditError::Digest(format!("undecodable digest {}: {}", encoded, e)))?
        } else {
            hex::decode(&encoded)
                .map_err(|e| AuditError::Digest(format!("undecodable digest {}: {}", encoded, e)))?
        };
        debug!(path = %path.display(), "Resumed digest chain");
        *self.prev.lock().unwrap_or_else(PoisonError::into_inner) = prev;
        Ok(self)
    }

    /// Return `line` with its digest appended and advance the chain.
    pub fn append(&self, line: &str) -> String {
        let digest = {
            let mut prev = self.prev.lock().unwrap_or_else(PoisonError::into_inner);
            let next = if self.chained {
                self.algorithm.digest_parts(&[prev.as_slice(), line.as_bytes()])
            } else {
                self.algorithm.digest(line.as_bytes())
            };
            *prev = next.clone();
            next
        };

        let encoded = if self.base64 {
            base64::engine::general_purpose::STANDARD.encode(&digest)
        } else {
            hex::encode(&digest)
        };
        format!("{}{}{}{}", line, self.prefix, encoded, self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_chain_links_lines() {
        let algorithm = DigestAlgorithm::Sha256;
        let chain = DigestChain::new(algorithm);
        let first = chain.append("one");

        let expected = algorithm.digest_parts(&[algorithm.digest(b"").as_slice(), &b"one"[..]]);
        assert_eq!(first, format!("one [digest:{}]", hex::encode(&expected)));

        let second = chain.append("two");
        let expected = algorithm.digest_parts(&[expected.as_slice(), &b"two"[..]]);
        assert_eq!(second, format!("two [digest:{}]", hex::encode(&expected)));
    }

    #[test]
    fn test_unchained_digest_depends_on_line_only() {
        let chain = DigestChain::new(DigestAlgorithm::Sha256).with_chained(false);
        let a = chain.append("same");
        let b = chain.append("same");
        assert_eq!(a, b);
    }

    #[test]
    fn test_resume_continues_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");

        let original = DigestChain::new(DigestAlgorithm::Sha256).with_base64(true);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", original.append("a")).unwrap();
        writeln!(file, "{}", original.append("b")).unwrap();
        drop(file);

        let resumed = DigestChain::new(DigestAlgorithm::Sha256)
            .with_base64(true)
            .resume_from_file(&path)
            .unwrap();
        assert_eq!(resumed.append("c"), original.append("c"));
    }

    #[test]
    fn test_resume_without_digest_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.log");
        std::fs::write(&path, "no digest here\n").unwrap();

        let resumed = DigestChain::new(DigestAlgorithm::Sha256)
            .resume_from_file(&path)
            .unwrap();
        let fresh = DigestChain::new(DigestAlgorithm::Sha256);
        assert_eq!(resumed.append("x"), fresh.append("x"));

        let missing = DigestChain::new(DigestAlgorithm::Sha256)
            .resume_from_file(&dir.path().join("absent.log"))
            .unwrap();
        assert_eq!(missing.append("x"), DigestChain::new(DigestAlgorithm::Sha256).append("x"));
    }

    #[test]
    fn test_custom_affixes() {
        let chain = DigestChain::new(DigestAlgorithm::Sha256).with_affixes(" #", "");
        let line = chain.append("x");
        assert!(line.starts_with("x #"));
        assert_eq!(line.len(), "x #".len() + 64);
    }
}
