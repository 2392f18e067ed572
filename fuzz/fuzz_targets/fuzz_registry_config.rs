//! Fuzz target for sanitizer registry configuration parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pl_redact::RegistryConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = serde_json::from_slice::<RegistryConfig>(data) {
        let _ = config.validate();
    }
});
