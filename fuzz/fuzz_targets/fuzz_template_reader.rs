//! Fuzz target for template stream reading.
//!
//! Template streams may come from untrusted sources; reading and verifying
//! must only ever return errors.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pl_audit::TemplateReader;

fuzz_target!(|data: &[u8]| {
    for template in TemplateReader::from_bytes(data.to_vec()).flatten() {
        let _ = template.verify();
        let _ = template.render_sanitized();
    }
});
