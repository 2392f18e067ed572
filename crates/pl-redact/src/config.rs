//! Registry configuration.
//!
//! A JSON document maps tag names to factory configurations:
//!
//! ```json
//! {
//!   "schema_version": "1.0.0",
//!   "tags": {
//!     "user":     { "factory": "blinding", "mask": "###" },
//!     "ip":       { "factory": "anonymizing" },
//!     "card":     { "factory": "symmetric_encryption", "rotate_iv": true },
//!     "email":    { "factory": "asymmetric_encryption", "recipient": "A2...=" },
//!     "hostname": { "factory": "identity" }
//!   }
//! }
//! ```
//!
//! Key material is given as base64.

use crate::error::{RedactionError, Result};
use crate::hash::{DigestAlgorithm, MacKey};
use crate::sanitizer::{
    AsymmetricEncryptionFactory, BlindingSanitizerFactory, IdentitySanitizerFactory,
    SanitizerFactory, SymmetricEncryptionFactory,
};
use crate::seal::RecipientKey;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Schema version for the registry configuration file.
pub const REGISTRY_SCHEMA_VERSION: &str = "1.0.0";

/// Tag to factory mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Factory configuration per tag name.
    #[serde(default)]
    pub tags: BTreeMap<String, FactoryConfig>,
}

fn default_schema_version() -> String {
    REGISTRY_SCHEMA_VERSION.to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            tags: BTreeMap::new(),
        }
    }
}

/// Configuration of one sanitizer factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "factory", rename_all = "snake_case")]
pub enum FactoryConfig {
    Identity,
    Blinding(BlindingConfig),
    Anonymizing(BlindingConfig),
    SymmetricEncryption(SymmetricConfig),
    AsymmetricEncryption(AsymmetricConfig),
}

/// Blinding and anonymizing options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlindingConfig {
    /// Replacement text; the factory default applies when absent.
    pub mask: Option<String>,
    /// Digest algorithm for digest blinding.
    pub digest: Option<DigestAlgorithm>,
    /// Base64 HMAC key; takes precedence over `digest`.
    pub mac_key: Option<String>,
    /// Hash function of the HMAC.
    pub mac_algorithm: DigestAlgorithm,
    /// Mask the critical value too. Ignored (always on) for anonymizing.
    pub mask_critical: bool,
}

/// Symmetric encryption options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymmetricConfig {
    pub identifier: Option<String>,
    pub show_sequence: bool,
    pub encrypt_critical: bool,
    pub rotate_iv: bool,
    /// Base64 AES-256 key; generated and escrowed when absent.
    pub key: Option<String>,
    /// Base64 12-byte starting IV for `rotate_iv`; generated and escrowed
    /// when absent.
    pub iv: Option<String>,
    /// Base64 SEC1 public key that generated key material is sealed to.
    pub escrow_recipient: Option<String>,
    /// File that generated key material is appended to (default stderr).
    pub escrow_file: Option<PathBuf>,
}

/// Asymmetric encryption options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsymmetricConfig {
    /// Base64 SEC1 recipient public key.
    pub recipient: String,
    pub identifier: Option<String>,
    pub show_sequence: bool,
    pub encrypt_critical: bool,
}

impl RegistryConfig {
    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RegistryConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check schema version and tag names.
    pub fn validate(&self) -> Result<()> {
        let major = self.schema_version.split('.').next().unwrap_or_default();
        if major != "1" {
            return Err(RedactionError::Config(format!(
                "unsupported schema version {}",
                self.schema_version
            )));
        }
        for tag in self.tags.keys() {
            if tag.is_empty() || tag.contains(['{', '}']) {
                return Err(RedactionError::Config(format!("invalid tag name {:?}", tag)));
            }
        }
        Ok(())
    }

    /// Add a tag mapping.
    pub fn insert(&mut self, tag: impl Into<String>, factory: FactoryConfig) {
        self.tags.insert(tag.into(), factory);
    }
}

impl FactoryConfig {
    /// Build the configured factory. The factory is not started.
    pub fn build(&self) -> Result<Box<dyn SanitizerFactory>> {
        Ok(match self {
            FactoryConfig::Identity => Box::new(IdentitySanitizerFactory::new()),
            FactoryConfig::Blinding(cfg) => {
                Box::new(cfg.apply(BlindingSanitizerFactory::new())?)
            }
            FactoryConfig::Anonymizing(cfg) => {
                Box::new(cfg.apply(BlindingSanitizerFactory::anonymizing())?)
            }
            FactoryConfig::SymmetricEncryption(cfg) => Box::new(cfg.build()?),
            FactoryConfig::AsymmetricEncryption(cfg) => Box::new(cfg.build()?),
        })
    }
}

impl BlindingConfig {
    fn apply(&self, factory: BlindingSanitizerFactory) -> Result<BlindingSanitizerFactory> {
        let mut factory = match self.mask {
            Some(ref mask) => factory.with_mask(mask.clone()),
            None => factory,
        };
        if let Some(digest) = self.digest {
            factory = factory.with_digest(digest);
        }
        if let Some(ref key) = self.mac_key {
            factory = factory.with_mac(MacKey::from_base64(key, self.mac_algorithm)?);
        }
        if self.mask_critical {
            factory.set_mask_critical(true)?;
        }
        Ok(factory)
    }
}

impl SymmetricConfig {
    fn build(&self) -> Result<SymmetricEncryptionFactory> {
        let mut factory = SymmetricEncryptionFactory::new()
            .with_sequence_numbers(self.show_sequence)
            .with_encrypt_critical(self.encrypt_critical)
            .with_rotate_iv(self.rotate_iv);
        if let Some(ref id) = self.identifier {
            factory = factory.with_identifier(id.clone());
        }
        if let Some(ref key) = self.key {
            factory = factory.with_key(&decode(key, "key")?);
        }
        if let Some(ref iv) = self.iv {
            factory = factory.with_iv(&decode(iv, "iv")?);
        }
        if let Some(ref recipient) = self.escrow_recipient {
            factory = factory.with_escrow_recipient(RecipientKey::from_base64(recipient)?);
        }
        if let Some(ref path) = self.escrow_file {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            factory = factory.with_escrow_sink(file);
        }
        Ok(factory)
    }
}

impl AsymmetricConfig {
    fn build(&self) -> Result<AsymmetricEncryptionFactory> {
        if self.recipient.is_empty() {
            return Err(RedactionError::Config(
                "asymmetric encryption requires a recipient key".to_string(),
            ));
        }
        let mut factory = AsymmetricEncryptionFactory::new()
            .with_recipient(RecipientKey::from_base64(&self.recipient)?)
            .with_sequence_numbers(self.show_sequence)
            .with_encrypt_critical(self.encrypt_critical);
        if let Some(ref id) = self.identifier {
            factory = factory.with_identifier(id.clone());
        }
        Ok(factory)
    }
}

fn decode(value: &str, what: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| RedactionError::Key(format!("invalid base64 {}: {}", what, e)))
}
