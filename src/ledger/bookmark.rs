//! Translation between ledger-native pagination bookmarks and a form that
//! survives JSON transport.
//!
//! Native bookmarks are composite keys and therefore contain NUL separators
//! and may contain the maximum code point. Both are replaced by two-character
//! escapes introduced by `/`, which is itself escaped as `//`.

use crate::error::{Error, Result};
use crate::ledger::stub::{MAX_UNICODE_RUNE, MIN_UNICODE_RUNE};

const ESCAPE: char = '/';
const NUL_MARKER: char = '0';
const MAX_MARKER: char = 'M';

/// Native bookmark → transportable bookmark.
pub fn encode(native: &str) -> String {
    let mut out = String::with_capacity(native.len());
    for c in native.chars() {
        match c {
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPE);
            }
            MIN_UNICODE_RUNE => {
                out.push(ESCAPE);
                out.push(NUL_MARKER);
            }
            MAX_UNICODE_RUNE => {
                out.push(ESCAPE);
                out.push(MAX_MARKER);
            }
            other => out.push(other),
        }
    }
    out
}

/// Transportable bookmark → native bookmark.
pub fn decode(transported: &str) -> Result<String> {
    let mut out = String::with_capacity(transported.len());
    let mut chars = transported.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(ESCAPE) => out.push(ESCAPE),
            Some(NUL_MARKER) => out.push(MIN_UNICODE_RUNE),
            Some(MAX_MARKER) => out.push(MAX_UNICODE_RUNE),
            Some(other) => {
                return Err(Error::BadRequest(format!(
                    "invalid bookmark escape '/{}'",
                    other
                )))
            }
            None => {
                return Err(Error::BadRequest(
                    "bookmark ends with a dangling escape".to_string(),
                ))
            }
        }
    }
    Ok(out)
}
