//! Plain-text sink for the sanitized view.

use crate::digest::DigestChain;
use crate::pattern::Pattern;
use crate::template::View;
use crate::Result;
use pl_redact::{ParamSanitizerRegistry, PrivacyRecord, RecordSink};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Renders each record through a pattern and writes one line per record.
///
/// Only the sanitized view is ever written. With a [`DigestChain`] attached
/// each line carries its chained digest; the digest is taken under the write
/// lock so the file order matches the chain order.
pub struct LineSink<W: Write + Send> {
    pattern: Pattern,
    registry: Option<Arc<ParamSanitizerRegistry>>,
    digest: Option<DigestChain>,
    out: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(pattern: Pattern, out: W) -> Self {
        Self {
            pattern,
            registry: None,
            digest: None,
            out: Mutex::new(out),
        }
    }

    /// Sanitize converter output through `registry`.
    pub fn with_registry(mut self, registry: Arc<ParamSanitizerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_digest(mut self, digest: DigestChain) -> Self {
        self.digest = Some(digest);
        self
    }

    /// Render and write one record.
    pub fn write_record(&self, record: &PrivacyRecord) -> Result<()> {
        let line = self
            .pattern
            .render(record, self.registry.as_deref(), View::Sanitized)?;

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let line = match &self.digest {
            Some(digest) => digest.append(&line),
            None => line,
        };
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> RecordSink for LineSink<W> {
    fn append(
        &self,
        record: &PrivacyRecord,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_record(record).map_err(Into::into)
    }
}
