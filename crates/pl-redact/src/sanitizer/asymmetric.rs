//! Public-key encrypting sanitizer. Values are sealed to a recipient P-256 key
//! and can only be read by the holder of the matching secret.

use super::encrypting::{EncryptingSanitizer, Encryptor, SealEngine};
use super::{Lifecycle, ParamSanitizer, SanitizerFactory};
use crate::error::{RedactionError, Result};
use crate::placeholder::Placeholder;
use crate::seal::RecipientKey;
use std::sync::{Arc, Mutex};

struct AsymmetricEngine {
    recipient: RecipientKey,
    sequence: Mutex<u64>,
}

impl SealEngine for AsymmetricEngine {
    fn seal(&self, plaintext: &[u8]) -> std::result::Result<(u64, Vec<u8>), String> {
        let mut sequence = self
            .sequence
            .lock()
            .map_err(|_| "sequence lock poisoned".to_string())?;
        let sealed = self.recipient.seal(plaintext).map_err(|e| e.to_string())?;
        let assigned = *sequence;
        *sequence += 1;
        Ok((assigned, sealed))
    }
}

/// Factory for sanitizers that seal values to a recipient key.
pub struct AsymmetricEncryptionFactory {
    identifier: String,
    show_sequence: bool,
    encrypt_critical: bool,
    recipient: Option<RecipientKey>,
    encryptor: Option<Arc<Encryptor>>,
    lifecycle: Lifecycle,
}

impl Default for AsymmetricEncryptionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AsymmetricEncryptionFactory {
    pub fn new() -> Self {
        Self {
            identifier: "asym".to_string(),
            show_sequence: false,
            encrypt_critical: false,
            recipient: None,
            encryptor: None,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn with_recipient(mut self, recipient: RecipientKey) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_sequence_numbers(mut self, show: bool) -> Self {
        self.show_sequence = show;
        self
    }

    pub fn with_encrypt_critical(mut self, encrypt_critical: bool) -> Self {
        self.encrypt_critical = encrypt_critical;
        self
    }
}

impl SanitizerFactory for AsymmetricEncryptionFactory {
    fn name(&self) -> &'static str {
        "asymmetric encryption factory"
    }

    fn start(&mut self) -> Result<()> {
        let recipient = self.recipient.clone().ok_or_else(|| {
            RedactionError::Config(format!("the {} requires a recipient key", self.name()))
        })?;
        self.encryptor = Some(Arc::new(Encryptor {
            identifier: self.identifier.clone(),
            show_sequence: self.show_sequence,
            encrypt_critical: self.encrypt_critical,
            engine: Box::new(AsymmetricEngine {
                recipient,
                sequence: Mutex::new(0),
            }),
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
        let encryptor = self.encryptor.clone()?;
        Some(Box::new(EncryptingSanitizer::new(
            tag,
            parameter,
            placeholder,
            encryptor,
        )))
    }
}
