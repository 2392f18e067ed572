//! Template stream writer.
//!
//! Signed templates are written as JSON lines, one template per line, and the
//! output is flushed after every template. Each line is serialized in full
//! before it reaches the sink. After a failed write the next template starts
//! on a fresh line, so a torn fragment never swallows a later template.

use crate::template::SignedTemplate;
use crate::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Writes signed templates to any byte sink.
pub struct TemplateWriter<W: Write> {
    out: W,
    written: u64,
    torn: bool,
}

impl TemplateWriter<BufWriter<File>> {
    /// Append to the file at `path`, creating it if needed.
    pub fn append_to(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), "Opened template stream");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TemplateWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            written: 0,
            torn: false,
        }
    }

    /// Write one template and flush.
    pub fn write(&mut self, template: &SignedTemplate) -> Result<()> {
        let mut line = Vec::with_capacity(512);
        if self.torn {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, template)?;
        line.push(b'\n');

        if let Err(e) = self.out.write_all(&line).and_then(|()| self.out.flush()) {
            self.torn = true;
            return Err(e.into());
        }
        self.torn = false;
        self.written += 1;
        debug!(template_id = template.id(), "Wrote template");
        Ok(())
    }

    /// Number of templates written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
