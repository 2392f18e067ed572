//! The identity sanitizer: no redaction at all.

use super::{Lifecycle, ParamSanitizer, SanitizerFactory};
use crate::error::Result;
use crate::placeholder::Placeholder;

/// Sanitizer whose sanitized value is the critical value.
///
/// Bound to every untagged `{}` placeholder, and created by
/// [`IdentitySanitizerFactory`] for tags that are explicitly not sanitized.
pub struct IdentitySanitizer {
    placeholder: Placeholder,
    value: String,
}

impl IdentitySanitizer {
    /// Bind `value` to `placeholder` without any redaction.
    pub fn new(value: String, placeholder: Placeholder) -> Self {
        Self { placeholder, value }
    }
}

impl ParamSanitizer for IdentitySanitizer {
    fn placeholder(&self) -> &Placeholder {
        &self.placeholder
    }

    fn critical(&self) -> Result<&str> {
        Ok(&self.value)
    }

    fn sanitized(&self) -> Result<&str> {
        Ok(&self.value)
    }

    fn critical_equals_sanitized(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Factory for tags that are recognized but deliberately left in clear.
#[derive(Debug, Default)]
pub struct IdentitySanitizerFactory {
    lifecycle: Lifecycle,
}

impl IdentitySanitizerFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SanitizerFactory for IdentitySanitizerFactory {
    fn name(&self) -> &'static str {
        "identity sanitizer factory"
    }

    fn start(&mut self) -> Result<()> {
        tracing::warn!("The identity sanitizer does NOT sanitize at all");
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
        Some(Box::new(IdentitySanitizer::new(parameter, placeholder)))
    }
}
