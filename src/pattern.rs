//! Classification of caller patterns.
//!
//! go/packages forwards patterns verbatim, including its query syntax
//! (`file=path`, `pattern=value`). Each pattern lands in exactly one list,
//! and every list keeps the relative input order.

use crate::error::DriverError;
use anyhow::Result;

pub const FILE_QUERY: &str = "file";
pub const PATTERN_QUERY: &str = "pattern";
/// Replacement for the removed `name=` query; accepted and dropped.
pub const LEGACY_QUERY: &str = "iamashamedtousethedisabledqueryname";
pub const STDLIB_PATTERN: &str = "std";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedPatterns {
    /// Values of `file=` queries.
    pub files: Vec<String>,
    /// Patterns passed through to the query.
    pub patterns: Vec<String>,
    /// Patterns naming the standard library.
    pub stdlib: Vec<String>,
}

impl ParsedPatterns {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.patterns.is_empty() && self.stdlib.is_empty()
    }

    fn push_plain(&mut self, pattern: &str) {
        if is_stdlib_pattern(pattern) {
            self.stdlib.push(pattern.to_string());
        } else {
            self.patterns.push(pattern.to_string());
        }
    }
}

pub fn parse_patterns<S: AsRef<str>>(input: &[S]) -> Result<ParsedPatterns> {
    let mut parsed = ParsedPatterns::default();
    for pattern in input {
        let pattern = pattern.as_ref();
        let Some((query, value)) = pattern.split_once('=') else {
            parsed.push_plain(pattern);
            continue;
        };
        match query {
            FILE_QUERY => parsed.files.push(value.to_string()),
            PATTERN_QUERY => parsed.patterns.push(value.to_string()),
            LEGACY_QUERY => {}
            "" => parsed.push_plain(pattern),
            _ if query.bytes().all(|b| b.is_ascii_lowercase()) => {
                return Err(DriverError::input(format!(
                    "invalid query type {query:?} in query pattern {pattern:?}"
                ))
                .into());
            }
            // `=` is part of the pattern itself, e.g. a path containing it.
            _ => parsed.push_plain(pattern),
        }
    }
    Ok(parsed)
}

/// `std`, or `std` followed by a separator such as `std/...`.
pub fn is_stdlib_pattern(pattern: &str) -> bool {
    match pattern.strip_prefix(STDLIB_PATTERN) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', ':', '@']),
        None => false,
    }
}
