//! Archive path handling.
//!
//! Entry names are stored with Windows separators. Everything past the parser
//! works on `/`-separated, normalized paths.

use crate::{Error, Result};

/// Canonical separator for virtual paths.
pub const SEPARATOR: char = '/';

/// Split a raw entry name into normalized path components.
///
/// Backslashes are treated as separators, empty and `.` components are dropped
/// and `..` removes the previous component.
pub fn components(name: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    for part in name.split(['\\', SEPARATOR]) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    parts
}

/// Normalize a raw entry name into a `/`-separated path.
///
/// Fails when nothing remains after normalization.
pub fn normalize(name: &str) -> Result<String> {
    let parts = components(name);
    if parts.is_empty() {
        return Err(Error::EmptyPath(name.to_string()));
    }
    Ok(parts.join("/"))
}
