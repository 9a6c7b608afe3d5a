//! `${name}` substitution.
//!
//! Names are ASCII alphanumerics, `_` and `.`. Anything else after `${`
//! (including an unterminated reference) is left as literal text.

use std::collections::HashMap;
use std::ops::Range;

/// Upper bound on substitution passes.
pub const MAX_PASSES: usize = 3;

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'.'
}

/// Next placeholder at or after `from`: (whole `${..}` span, name span).
fn next_placeholder(value: &str, from: usize) -> Option<(Range<usize>, Range<usize>)> {
    let bytes = value.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            let name_start = i + 2;
            let mut end = name_start;
            while end < bytes.len() && is_name_char(bytes[end]) {
                end += 1;
            }
            if end > name_start && end < bytes.len() && bytes[end] == b'}' {
                return Some((i..end + 1, name_start..end));
            }
        }
        i += 1;
    }
    None
}

/// Whether `value` holds at least one well-formed placeholder.
pub fn has_placeholder(value: &str) -> bool {
    next_placeholder(value, 0).is_some()
}

/// Replace every placeholder in `value` using `lookup`; unknown names become
/// the empty string.
pub fn substitute(value: &str, lookup: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut cursor = 0;
    while let Some((whole, name)) = next_placeholder(value, cursor) {
        out.push_str(&value[cursor..whole.start]);
        if let Some(replacement) = lookup.get(&value[name]) {
            out.push_str(replacement);
        }
        cursor = whole.end;
    }
    out.push_str(&value[cursor..]);
    out
}

/// Resolve placeholders in place, at most [`MAX_PASSES`] passes.
///
/// Every pass reads from a snapshot taken when the pass starts, so a chain
/// of references `k` levels deep needs `k` passes. Returns the number of
/// passes that ran.
pub fn resolve(values: &mut HashMap<String, String>) -> usize {
    let mut passes = 0;
    while passes < MAX_PASSES {
        let pending: Vec<String> = values
            .iter()
            .filter(|(_, v)| has_placeholder(v))
            .map(|(k, _)| k.clone())
            .collect();
        if pending.is_empty() {
            break;
        }

        let snapshot = values.clone();
        for key in pending {
            if let Some(value) = values.get_mut(&key) {
                *value = substitute(value, &snapshot);
            }
        }
        passes += 1;
    }
    passes
}
