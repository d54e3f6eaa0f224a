//! Turns file queries and patterns into build-graph labels.

use crate::bazel::Bazel;
use crate::util;
use anyhow::Result;
use std::path::Path;
use tracing::debug;

/// Query expression selecting the Go targets that list `file` as a source.
pub fn file_query(workspace_root: &Path, file: &str) -> String {
    let rel = util::relative_to(workspace_root, Path::new(file));
    format!(
        "kind(\"go_\", same_pkg_direct_rdeps({}))",
        quote_query_word(&rel)
    )
}

/// Double-quoted query word; `"` and `\` are backslash-escaped, everything
/// else is kept as is.
fn quote_query_word(word: &str) -> String {
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('"');
    for c in word.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// One union expression covering patterns and file queries, in input order.
/// Union deduplicates, so mixing both kinds is well defined.
pub fn query_expression(workspace_root: &Path, files: &[String], patterns: &[String]) -> String {
    let terms: Vec<String> = patterns
        .iter()
        .cloned()
        .chain(files.iter().map(|file| file_query(workspace_root, file)))
        .collect();
    terms.join(" + ")
}

/// Splits query output into labels, one per line.
pub fn parse_labels(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

pub fn resolve_targets(
    bazel: &Bazel,
    workspace_root: &Path,
    flags: &[String],
    files: &[String],
    patterns: &[String],
) -> Result<Vec<String>> {
    let expr = query_expression(workspace_root, files, patterns);
    if expr.is_empty() {
        return Ok(Vec::new());
    }
    let stdout = bazel.query(flags, &[expr])?;
    let targets = parse_labels(&stdout);
    debug!(count = targets.len(), "resolved targets");
    Ok(targets)
}
