//! Fuzz target for conversion pattern parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pl_audit::Pattern;

fuzz_target!(|data: &str| {
    let _ = Pattern::parse(data);
});
