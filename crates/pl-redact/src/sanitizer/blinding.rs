//! Blinding and anonymizing sanitizers.
//!
//! The sanitized value is, in order of precedence: a keyed MAC of the value,
//! a digest of the value, a fixed mask, or `[tag]`. MAC and digest outputs are
//! base64 encoded.
//!
//! With mask-critical enabled the critical value is replaced by the sanitized
//! one as well, so the original is not recoverable from either view. The
//! anonymizing configuration has mask-critical permanently enabled.

use super::{Lifecycle, ParamSanitizer, SanitizerFactory};
use crate::error::{RedactionError, Result};
use crate::hash::{DigestAlgorithm, MacKey};
use crate::placeholder::Placeholder;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Default blinding mask.
pub const BLINDING_MASK: &str = "*****";

#[derive(Debug)]
struct Blinder {
    mask: Option<String>,
    digest: Option<DigestAlgorithm>,
    mac: Option<MacKey>,
    mask_critical: bool,
}

impl Blinder {
    fn blind(&self, tag: &str, value: &str) -> Result<String> {
        if let Some(ref mac) = self.mac {
            return mac
                .mac_base64(value.as_bytes())
                .map_err(|e| RedactionError::crypto(tag, e));
        }
        if let Some(digest) = self.digest {
            return Ok(digest.digest_base64(value.as_bytes()));
        }
        Ok(match self.mask {
            Some(ref mask) => mask.clone(),
            None => format!("[{}]", tag),
        })
    }
}

/// Sanitizer produced by [`BlindingSanitizerFactory`].
pub struct BlindingSanitizer {
    placeholder: Placeholder,
    tag: String,
    value: String,
    blinder: Arc<Blinder>,
    sanitized: OnceCell<String>,
}

impl ParamSanitizer for BlindingSanitizer {
    fn placeholder(&self) -> &Placeholder {
        &self.placeholder
    }

    fn critical(&self) -> Result<&str> {
        if self.blinder.mask_critical {
            self.sanitized()
        } else {
            Ok(&self.value)
        }
    }

    fn sanitized(&self) -> Result<&str> {
        self.sanitized
            .get_or_try_init(|| self.blinder.blind(&self.tag, &self.value))
            .map(String::as_str)
    }

    fn critical_equals_sanitized(&self) -> Result<bool> {
        if self.blinder.mask_critical {
            return Ok(true);
        }
        Ok(self.critical()? == self.sanitized()?)
    }
}

/// Factory for blinding (and anonymizing) sanitizers.
#[derive(Debug)]
pub struct BlindingSanitizerFactory {
    mask: Option<String>,
    digest: Option<DigestAlgorithm>,
    mac: Option<MacKey>,
    mask_critical: bool,
    anonymizing: bool,
    blinder: Option<Arc<Blinder>>,
    lifecycle: Lifecycle,
}

impl Default for BlindingSanitizerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BlindingSanitizerFactory {
    /// Blinding with the default mask; the critical view keeps the original.
    pub fn new() -> Self {
        Self {
            mask: Some(BLINDING_MASK.to_string()),
            digest: None,
            mac: None,
            mask_critical: false,
            anonymizing: false,
            blinder: None,
            lifecycle: Lifecycle::default(),
        }
    }

    /// Anonymizing configuration: no default mask, mask-critical forced on.
    pub fn anonymizing() -> Self {
        Self {
            mask: None,
            mask_critical: true,
            anonymizing: true,
            ..Self::new()
        }
    }

    /// Use `mask` as the sanitized value.
    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// Drop the mask; without digest or MAC the output becomes `[tag]`.
    pub fn without_mask(mut self) -> Self {
        self.mask = None;
        self
    }

    /// Replace values by their digest.
    pub fn with_digest(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest = Some(algorithm);
        self
    }

    /// Replace values by their keyed MAC. Takes precedence over a digest.
    pub fn with_mac(mut self, key: MacKey) -> Self {
        self.mac = Some(key);
        self
    }

    /// Whether the critical view is masked too.
    pub fn is_mask_critical(&self) -> bool {
        self.mask_critical
    }

    /// Enable or disable masking of the critical view.
    ///
    /// The anonymizing configuration rejects disabling it.
    pub fn set_mask_critical(&mut self, mask_critical: bool) -> Result<()> {
        if self.anonymizing && !mask_critical {
            return Err(RedactionError::Config(
                "for the anonymizing sanitizer the critical value must be masked".to_string(),
            ));
        }
        self.mask_critical = mask_critical;
        Ok(())
    }

    /// Whether this factory is the anonymizing configuration.
    pub fn is_anonymizing(&self) -> bool {
        self.anonymizing
    }
}

impl SanitizerFactory for BlindingSanitizerFactory {
    fn name(&self) -> &'static str {
        if self.anonymizing {
            "anonymizing sanitizer factory"
        } else {
            "blinding sanitizer factory"
        }
    }

    fn start(&mut self) -> Result<()> {
        self.blinder = Some(Arc::new(Blinder {
            mask: self.mask.clone(),
            digest: self.digest,
            mac: self.mac.clone(),
            mask_critical: self.mask_critical || self.anonymizing,
        }));
        self.lifecycle.mark_started();
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
        let blinder = self.blinder.clone()?;
        Some(Box::new(BlindingSanitizer {
            placeholder,
            tag: tag.to_string(),
            value: parameter,
            blinder,
            sanitized: OnceCell::new(),
        }))
    }
}
