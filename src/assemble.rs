//! Loads package descriptors produced by a build and rewrites their paths.

use crate::error::DriverError;
use crate::schema::Package;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File dropped into a directory of standard library descriptors.
pub const STDLIB_MARKER: &str = ".stdlib_marker";
/// Go build cache kept next to the stdlib descriptors; never descriptors.
pub const TOOL_CACHE_DIR: &str = ".gocache";
/// Paths under this prefix live in the execution root.
pub const EXTERNAL_PREFIX: &str = "external/";

/// Directory of descriptors a stdlib marker stands for.
pub fn stdlib_dir(path: &Path) -> Option<PathBuf> {
    if path.file_name() != Some(OsStr::new(STDLIB_MARKER)) {
        return None;
    }
    path.parent().map(Path::to_path_buf)
}

/// Loads every descriptor named by `paths`. Directories and stdlib markers
/// are walked recursively.
pub fn load_package_files(paths: &[PathBuf]) -> Result<Vec<Package>> {
    let mut pkgs = Vec::new();
    for path in paths {
        let path = stdlib_dir(path).unwrap_or_else(|| path.clone());
        let metadata =
            fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?;
        if metadata.is_dir() {
            pkgs.extend(load_package_dir(&path)?);
        } else {
            pkgs.push(load_package_file(&path)?);
        }
    }
    debug!(count = pkgs.len(), "loaded package descriptors");
    Ok(pkgs)
}

pub fn load_package_file(path: &Path) -> Result<Package> {
    let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let pkg = serde_json::from_slice(&data).map_err(|err| DriverError::load(path, err))?;
    Ok(pkg)
}

fn load_package_dir(dir: &Path) -> Result<Vec<Package>> {
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .filter_entry(|entry| entry.file_name() != OsStr::new(TOOL_CACHE_DIR))
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut pkgs = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if path.file_name() == Some(OsStr::new(STDLIB_MARKER))
            || path.extension() != Some(OsStr::new("json"))
        {
            continue;
        }
        pkgs.push(load_package_file(path)?);
    }
    Ok(pkgs)
}

/// Absolute form of a path found in a descriptor.
pub fn canonicalize_path(path: &str, workspace_root: &Path, exec_root: &Path) -> String {
    if Path::new(path).is_absolute() {
        return path.to_string();
    }
    let base = if path.starts_with(EXTERNAL_PREFIX) {
        exec_root
    } else {
        workspace_root
    };
    base.join(path).to_string_lossy().to_string()
}

pub fn canonicalize_package(pkg: &mut Package, workspace_root: &Path, exec_root: &Path) {
    let fix = |path: &mut String| *path = canonicalize_path(path, workspace_root, exec_root);
    pkg.go_files.iter_mut().for_each(fix);
    pkg.compiled_go_files.iter_mut().for_each(fix);
    pkg.other_files.iter_mut().for_each(fix);
    if let Some(export_file) = pkg.export_file.as_mut() {
        fix(export_file);
    }
}
