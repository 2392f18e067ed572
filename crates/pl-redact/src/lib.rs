//! Privacy-aware log message construction.
//!
//! Message templates mark sensitive parameters with a named placeholder
//! (`"User {user} logged in from {ip}"`). Each tag name is governed by a
//! sanitizer factory, and every log call is turned into a record with two
//! views: a sanitized message for ordinary sinks and a critical message for
//! authorized consumers.
//!
//! # Key Features
//!
//! - **Tagged placeholders**: `{}` passes a parameter through, `{tag}` routes
//!   it through the factory registered under `tag`, and backslashes escape
//!   braces in pairs.
//! - **Default deny**: a tag without a started factory is never bound; the
//!   parameter is dropped and the placeholder text is kept.
//! - **Sanitizers**: identity, blinding (mask, digest or keyed MAC),
//!   anonymizing, AES-256-GCM and public-key (P-256 ECIES) encryption.
//! - **Lazy views**: each view, and each sanitized value, is computed at most
//!   once.
//!
//! # Example
//!
//! ```
//! use pl_redact::{BlindingSanitizerFactory, ParamSanitizerRegistry, PrivacyRecord};
//!
//! let mut registry = ParamSanitizerRegistry::new();
//! registry
//!     .register("user", BlindingSanitizerFactory::new().with_mask("###"))
//!     .unwrap();
//!
//! let record = PrivacyRecord::build(&registry, "User {user}", vec!["alice".into()]);
//! assert_eq!(record.sanitized_message().unwrap(), "User ###");
//! assert_eq!(record.critical_message().unwrap(), "User alice");
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod hash;
pub mod placeholder;
pub mod record;
pub mod registry;
pub mod sanitizer;
pub mod seal;

pub use config::{
    AsymmetricConfig, BlindingConfig, FactoryConfig, RegistryConfig, SymmetricConfig,
    REGISTRY_SCHEMA_VERSION,
};
pub use error::{RedactionError, Result};
pub use filter::{FilterStats, PrivacyFilter};
pub use hash::{DigestAlgorithm, MacKey};
pub use placeholder::{parse, ParsedTemplate, Placeholder, MARKER};
pub use record::{render_error, LogEvent, PrivacyRecord, RecordSink};
pub use registry::ParamSanitizerRegistry;
pub use sanitizer::{
    AsymmetricEncryptionFactory, BlindingSanitizer, BlindingSanitizerFactory, EncryptedToken,
    EncryptingSanitizer, IdentitySanitizer, IdentitySanitizerFactory, KeyEscrow, ParamSanitizer,
    SanitizerFactory, SymmetricEncryptionFactory, BLINDING_MASK,
};
pub use seal::{RecipientKey, RecipientSecret};
