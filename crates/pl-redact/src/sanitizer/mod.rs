//! Parameter sanitizers and the factories that create them.
//!
//! A sanitizer is bound to one placeholder and one raw parameter value and
//! derives two strings from it:
//!
//! - **critical**: the full information, for authorized consumers
//! - **sanitized**: the redacted substitute, safe for default disclosure
//!
//! Both are computed at most once per sanitizer. Cryptographic failures are
//! deferred to the first access and surface as [`RedactionError::Crypto`].
//!
//! Factories are configured per tag name, own any long-lived key material and
//! follow a simple lifecycle: configure, [`SanitizerFactory::start`], create,
//! [`SanitizerFactory::stop`]. A factory that is not started creates nothing,
//! which drops the parameter from the record.
//!
//! [`RedactionError::Crypto`]: crate::RedactionError::Crypto

mod asymmetric;
mod blinding;
mod encrypting;
mod identity;
mod symmetric;

pub use asymmetric::AsymmetricEncryptionFactory;
pub use blinding::{BlindingSanitizer, BlindingSanitizerFactory, BLINDING_MASK};
pub use encrypting::{EncryptedToken, EncryptingSanitizer};
pub use identity::{IdentitySanitizer, IdentitySanitizerFactory};
pub use symmetric::{
    advance_iv, decrypt_prefixed, decrypt_symmetric, KeyEscrow, SymmetricEncryptionFactory,
    IV_LEN, KEY_LEN,
};

use crate::error::Result;
use crate::placeholder::Placeholder;
use std::sync::atomic::{AtomicBool, Ordering};

/// A sanitizer bound to one parameter occurrence.
pub trait ParamSanitizer: Send + Sync {
    /// The placeholder this sanitizer was created for.
    fn placeholder(&self) -> &Placeholder;

    /// Full-information rendering of the parameter.
    fn critical(&self) -> Result<&str>;

    /// Redacted rendering of the parameter.
    fn sanitized(&self) -> Result<&str>;

    /// Whether [`critical`](Self::critical) and [`sanitized`](Self::sanitized)
    /// are the same string.
    fn critical_equals_sanitized(&self) -> Result<bool> {
        Ok(self.critical()? == self.sanitized()?)
    }
}

/// Stateful, tag-keyed constructor of sanitizers.
pub trait SanitizerFactory: Send + Sync {
    /// Component name used in status messages.
    fn name(&self) -> &'static str;

    /// Validate configuration and initialize key material.
    ///
    /// A failing start leaves the factory un-started.
    fn start(&mut self) -> Result<()>;

    /// Stop creating sanitizers.
    fn stop(&self);

    /// Whether [`start`](Self::start) completed and [`stop`](Self::stop) was not called.
    fn is_started(&self) -> bool;

    /// Create a sanitizer for `parameter`.
    ///
    /// Returns `None` only when the factory is not started.
    fn create(
        &self,
        tag: &str,
        parameter: String,
        placeholder: Placeholder,
    ) -> Option<Box<dyn ParamSanitizer>>;
}

/// Started flag shared by the factory implementations.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    started: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub(crate) fn mark_stopped(&self) {
        self.started.store(false, Ordering::Release);
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Report a create call on a factory that is not running.
    pub(crate) fn check(&self, component: &str, tag: &str) -> bool {
        let started = self.is_started();
        if !started {
            tracing::error!(tag = %tag, "The {} has not been started; dropping parameter", component);
        }
        started
    }
}
