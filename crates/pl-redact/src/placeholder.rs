//! Tagged placeholder parsing.
//!
//! A message template marks substitution points with braces. The brace
//! content is the *tag*: `{}` is an ordinary substitution, `{user}` names the
//! sanitizer factory that governs the parameter. Backslashes in front of a
//! brace escape it in pairs:
//!
//! | input        | parameter consumed | output          |
//! |--------------|--------------------|-----------------|
//! | `{tag}`      | yes                | value           |
//! | `\{tag}`     | no                 | `{tag}`         |
//! | `\\{tag}`    | yes                | `\` value       |
//! | `\\\{tag}`   | no                 | `\{tag}`        |
//!
//! Parsing rewrites every bound placeholder into the uniform marker `{}` and
//! records where each one sits, both in the rewritten template and in the
//! original input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Uniform marker that replaces every bound placeholder in a rewritten template.
pub const MARKER: &str = "{}";

// A run of backslashes followed by a brace pair without nested braces.
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\\*)\{([^{}]*)\}").unwrap());

/// A located substitution point.
///
/// All offsets are byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    /// Raw tag name; empty for an ordinary `{}` substitution.
    pub tag: String,

    /// Index of the bound parameter in the caller's parameter list.
    pub param_index: usize,

    /// Offset of the marker in the rewritten template.
    pub start: usize,

    /// Offset of the opening brace in the original template.
    pub original_start: usize,

    /// Offset of the closing brace in the original template (inclusive).
    pub original_end: usize,
}

impl Placeholder {
    /// A placeholder that is not located in any template.
    ///
    /// Used when a single value (a converter field, for example) is sanitized
    /// on its own.
    pub fn detached(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            param_index: 0,
            start: 0,
            original_start: 0,
            original_end: 0,
        }
    }

    /// Whether this is an ordinary, untagged substitution.
    pub fn is_non_critical(&self) -> bool {
        self.tag.is_empty()
    }

    /// Offset just past the marker in the rewritten template.
    pub fn end(&self) -> usize {
        self.start + MARKER.len()
    }
}

/// Output of [`parse`].
#[derive(Debug, Clone)]
pub struct ParsedTemplate<S> {
    /// Template with every bound placeholder collapsed to [`MARKER`].
    pub rewritten: String,

    /// Values produced by the resolver, in parameter order.
    pub bound: Vec<S>,

    /// Number of parameters consumed, including dropped ones.
    pub consumed: usize,
}

/// Parse `template`, binding at most `param_count` parameters left to right.
///
/// For every live placeholder `resolve(tag, param_index, placeholder)` is
/// called. Returning `None` drops the parameter: it is consumed, but the
/// original text of the placeholder is kept verbatim and no marker is
/// emitted. Untagged placeholders are resolved through the same callback
/// with an empty tag.
///
/// Escaped placeholders never consume a parameter. Once all parameters are
/// consumed the remaining text passes through unchanged.
pub fn parse<S, F>(template: &str, param_count: usize, mut resolve: F) -> ParsedTemplate<S>
where
    F: FnMut(&str, usize, Placeholder) -> Option<S>,
{
    let mut rewritten = String::with_capacity(template.len());
    let mut bound = Vec::new();
    let mut cur_pos = 0;
    let mut next_param = 0;

    for caps in RE_TAG.captures_iter(template) {
        if next_param >= param_count {
            break;
        }

        let Some(whole) = caps.get(0) else {
            continue;
        };
        let slashes = caps.get(1).map_or(0, |m| m.len());
        let tag = caps.get(2).map_or("", |m| m.as_str());

        if slashes % 2 == 0 {
            let param_index = next_param;
            next_param += 1;

            let placeholder = Placeholder {
                tag: tag.to_string(),
                param_index,
                start: rewritten.len() + (whole.start() - cur_pos) + slashes / 2,
                original_start: whole.start() + slashes,
                original_end: whole.end() - 1,
            };

            match resolve(tag, param_index, placeholder) {
                Some(value) => {
                    rewritten.push_str(&template[cur_pos..whole.start()]);
                    push_backslashes(&mut rewritten, slashes / 2);
                    rewritten.push_str(MARKER);
                    bound.push(value);
                }
                // Keep the literal text; cur_pos stays put so it is copied
                // together with the next run.
                None => continue,
            }
        } else {
            rewritten.push_str(&template[cur_pos..whole.start()]);
            push_backslashes(&mut rewritten, (slashes - 1) / 2);
            rewritten.push('{');
            rewritten.push_str(tag);
            rewritten.push('}');
        }

        cur_pos = whole.end();
    }

    rewritten.push_str(&template[cur_pos..]);

    ParsedTemplate {
        rewritten,
        bound,
        consumed: next_param,
    }
}

fn push_backslashes(out: &mut String, count: usize) {
    out.extend(std::iter::repeat('\\').take(count));
}

/// Render a rewritten template by replacing each marker with a value.
///
/// `values` yields `(marker_start, text)` pairs in template order.
pub(crate) fn render<'a, I>(rewritten: &str, values: I) -> String
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    let mut out = String::with_capacity(rewritten.len());
    let mut cur_pos = 0;
    for (start, text) in values {
        out.push_str(&rewritten[cur_pos..start]);
        out.push_str(text);
        cur_pos = start + MARKER.len();
    }
    out.push_str(&rewritten[cur_pos..]);
    out
}
