//! Listing for directories outside any workspace: delegate to the go tool,
//! then flatten its import graph into one package list.

use crate::golist::GoList;
use crate::harvest::Facets;
use crate::schema::{DriverResponse, Package};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub fn list_fallback<S: AsRef<str>>(
    go: GoList,
    facets: Facets,
    build_flags: &[String],
    patterns: &[S],
) -> Result<DriverResponse> {
    let mut go = go.flags(build_flags);
    if facets.tests {
        go = go.flag("-test");
    }
    if facets.export {
        // Export data needs the dependencies compiled as well.
        go = go.flag("-export").flag("-deps");
    } else if facets.deps {
        go = go.flag("-deps");
    }

    let listed = go.run(patterns).context("list packages without a workspace")?;
    let mut roots = Vec::new();
    let mut pkgs = Vec::with_capacity(listed.len());
    for entry in listed {
        let dep_only = entry.dep_only;
        let pkg = entry.into_package("");
        if !dep_only {
            roots.push(pkg.id.clone());
        }
        pkgs.push(pkg);
    }
    debug!(roots = roots.len(), packages = pkgs.len(), "listed packages");
    Ok(flatten(roots, pkgs))
}

/// Packages reachable from `roots` through their imports, each once, in
/// discovery order. Imports naming unlisted packages are skipped.
pub fn flatten(roots: Vec<String>, pkgs: Vec<Package>) -> DriverResponse {
    let mut by_id: HashMap<String, Package> = HashMap::with_capacity(pkgs.len());
    for pkg in pkgs {
        by_id.entry(pkg.id.clone()).or_insert(pkg);
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut packages = Vec::new();
    let mut stack: Vec<String> = roots.iter().rev().cloned().collect();
    while let Some(id) = stack.pop() {
        if seen.contains(&id) {
            continue;
        }
        let Some(pkg) = by_id.remove(&id) else {
            continue;
        };
        seen.insert(id);
        stack.extend(pkg.imports.values().rev().cloned());
        packages.push(pkg);
    }

    DriverResponse {
        sizes: None,
        roots,
        packages,
    }
}
