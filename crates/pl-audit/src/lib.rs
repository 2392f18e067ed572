//! Signed audit templates for privacy-aware logs.
//!
//! Records built by `pl_redact` carry a sanitized and a critical view. This
//! crate turns a stream of such records into signed templates: every
//! `batch_size` records the accumulated entries are signed with ECDSA P-256
//! and written as one JSON line. The signature covers fixed text and both
//! values of every exchangeable entry, so either view can be rendered from a
//! template that still verifies.
//!
//! # Template Format
//!
//! One JSON object per line:
//! - `id`, `name`, `created_at`: template identity
//! - `entries`: `fixed`, `exchangeable` or `blank` entries
//! - `signature`: algorithm, DER signature, signer key, optional certificate
//!   and recipient keys
//!
//! # Example
//!
//! ```no_run
//! use pl_audit::{BatchConfig, SigningIdentity, TemplateBuilder, TemplateReader};
//! use pl_redact::{BlindingSanitizerFactory, ParamSanitizerRegistry, PrivacyRecord};
//! use std::fs::File;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let mut registry = ParamSanitizerRegistry::new();
//! registry.register("user", BlindingSanitizerFactory::new()).unwrap();
//! let registry = Arc::new(registry);
//!
//! let builder = TemplateBuilder::configure(BatchConfig::default())
//!     .signer(SigningIdentity::generate())
//!     .registry(registry.clone())
//!     .output(File::create("audit.jsonl").unwrap())
//!     .start()
//!     .unwrap();
//!
//! let record = PrivacyRecord::build(&registry, "User {user}", vec!["alice".into()]);
//! builder.consume(&record).unwrap();
//! builder.close().unwrap();
//!
//! for template in TemplateReader::open(Path::new("audit.jsonl")).unwrap() {
//!     let template = template.unwrap();
//!     template.verify().unwrap();
//!     println!("{}", template.render_sanitized());
//! }
//! ```

pub mod builder;
pub mod digest;
pub mod error;
pub mod line;
pub mod pattern;
pub mod reader;
pub mod shutdown;
pub mod signer;
pub mod template;
pub mod writer;

pub use builder::{BatchConfig, BatchStats, BuilderSetup, TemplateBuilder, DEFAULT_BATCH_SIZE};
pub use digest::{DigestChain, DEFAULT_DIGEST_PREFIX, DEFAULT_DIGEST_SUFFIX};
pub use error::{AuditError, Result};
pub use line::LineSink;
pub use pattern::{Converter, Pattern, DEFAULT_DATE_FORMAT, DEFAULT_PATTERN};
pub use reader::TemplateReader;
pub use shutdown::{run_shutdown_hooks, ShutdownHook};
pub use signer::{verify_signature, SigningIdentity, SIGNATURE_ALGORITHM};
pub use template::{Entry, SignatureBlock, SignedTemplate, Template, View, TEMPLATE_NAME_PREFIX};
pub use writer::TemplateWriter;
