//! Fuzz target for tagged placeholder parsing.
//!
//! Checks that parsing never panics and that every bound marker points at a
//! `{}` in the rewritten template.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pl_redact::{parse, MARKER};

#[derive(Arbitrary, Debug)]
struct Input {
    template: String,
    params: u8,
}

fuzz_target!(|input: Input| {
    let parsed = parse(&input.template, input.params as usize, |_, _, p| Some(p));
    assert!(parsed.consumed <= input.params as usize);
    for p in &parsed.bound {
        assert_eq!(&parsed.rewritten[p.start..p.end()], MARKER);
    }
});
