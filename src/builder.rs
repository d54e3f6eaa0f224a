//! Package descriptor builder.
//!
//! Runs inside the aspect's actions: classifies a unit's sources with the
//! metadata extractor and writes one descriptor per compilation unit. The
//! `stdlib` variant lists the whole standard library through the go tool.

use crate::assemble::{STDLIB_MARKER, TOOL_CACHE_DIR};
use crate::constraint::BuildContext;
use crate::error::DriverError;
use crate::extract::{Metadata, MetadataExtractor};
use crate::golist::GoList;
use crate::schema::Package;
use crate::util;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Package name reported when no compiled source matched.
pub const EMPTY_PACKAGE_NAME: &str = "empty";
const TEST_PACKAGE_SUFFIX: &str = "_test";

/// Which package variant a unit keeps when test sources are mixed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TestFilter {
    #[default]
    Off,
    Only,
    Exclude,
}

impl TestFilter {
    pub fn accepts(self, meta: &Metadata) -> bool {
        match self {
            TestFilter::Off => true,
            TestFilter::Only => meta.package.ends_with(TEST_PACKAGE_SUFFIX),
            TestFilter::Exclude => !meta.package.ends_with(TEST_PACKAGE_SUFFIX),
        }
    }
}

impl FromStr for TestFilter {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(TestFilter::Off),
            "only" => Ok(TestFilter::Only),
            "exclude" => Ok(TestFilter::Exclude),
            other => Err(DriverError::input(format!("invalid test filter {other:?}"))),
        }
    }
}

/// A direct dependency: `label=importpath=importmap=file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub label: String,
    pub import_path: String,
    pub import_map: String,
    pub file: String,
}

impl FromStr for Archive {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('=').collect();
        let [label, import_path, import_map, file] = parts.as_slice() else {
            return Err(DriverError::input(format!("badly formed -arc flag: {s}")));
        };
        Ok(Archive {
            label: label.to_string(),
            import_path: import_path.to_string(),
            import_map: import_map.to_string(),
            file: file.to_string(),
        })
    }
}

/// Everything known about one compilation unit before its sources are read.
#[derive(Debug, Clone, Default)]
pub struct PackageInputs {
    pub id: String,
    pub import_path: String,
    pub import_map: String,
    pub export_file: Option<String>,
    /// Sources handed to the compiler, possibly after cgo/cover processing.
    pub go_srcs: Vec<PathBuf>,
    /// Non-Go sources (C, assembly, ...).
    pub other_srcs: Vec<PathBuf>,
    /// Sources as written, before any processing.
    pub orig_srcs: Vec<PathBuf>,
    pub test_filter: TestFilter,
    pub archives: Vec<Archive>,
}

pub struct PackageBuilder {
    extractor: MetadataExtractor,
    ctx: BuildContext,
    stdlib_id_prefix: String,
}

impl PackageBuilder {
    pub fn new(ctx: BuildContext, stdlib_id_prefix: impl Into<String>) -> Result<Self> {
        Ok(Self {
            extractor: MetadataExtractor::new()?,
            ctx,
            stdlib_id_prefix: stdlib_id_prefix.into(),
        })
    }

    pub fn build(&mut self, inputs: &PackageInputs) -> Result<Package> {
        let import_path_to_label: HashMap<&str, &str> = inputs
            .archives
            .iter()
            .map(|arc| (arc.import_path.as_str(), arc.label.as_str()))
            .collect();

        let mut pkg = Package {
            id: inputs.id.clone(),
            pkg_path: inputs.import_map.clone(),
            export_file: inputs.export_file.clone(),
            ..Default::default()
        };

        for src in &inputs.orig_srcs {
            let meta = self.extractor.read(&self.ctx, src, false)?;
            if meta.matched && inputs.test_filter.accepts(&meta) {
                pkg.go_files.push(path_string(src));
            }
        }
        for src in &inputs.other_srcs {
            if self.extractor.read(&self.ctx, src, false)?.matched {
                pkg.other_files.push(path_string(src));
            }
        }
        for src in &inputs.go_srcs {
            let meta = self.extractor.read(&self.ctx, src, true)?;
            if !meta.matched || !inputs.test_filter.accepts(&meta) {
                continue;
            }
            pkg.compiled_go_files.push(path_string(src));
            if pkg.name.is_empty() {
                pkg.name = meta.package.clone();
            }
            for imp in meta.imports.iter().filter(|imp| imp.as_str() != "C") {
                let id = match import_path_to_label.get(imp.as_str()) {
                    Some(label) => label.to_string(),
                    None => format!("{}{imp}", self.stdlib_id_prefix),
                };
                pkg.imports.insert(imp.clone(), id);
            }
        }
        if pkg.name.is_empty() {
            pkg.name = EMPTY_PACKAGE_NAME.to_string();
        }
        debug!(
            id = %pkg.id,
            name = %pkg.name,
            files = pkg.compiled_go_files.len(),
            imports = pkg.imports.len(),
            "built package descriptor"
        );
        Ok(pkg)
    }

    /// Builds the descriptor and writes it to `out`.
    pub fn build_to(&mut self, inputs: &PackageInputs, out: &Path) -> Result<Package> {
        let pkg = self.build(inputs)?;
        util::write_json_file(&pkg, out)?;
        Ok(pkg)
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Lists the standard library with `go_bin` and writes one descriptor per
/// package under `out_dir`, mirroring import paths, plus the marker file the
/// driver uses to recognize the directory. Returns the package count.
pub fn build_stdlib_packages(go_bin: &Path, out_dir: &Path, id_prefix: &str) -> Result<usize> {
    let go_bin = util::abs_path(go_bin)?;
    let out_dir = util::abs_path(out_dir)?;
    let go_dir = go_bin
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut go = GoList::new(&go_bin, &go_dir)
        .env("PATH", go_dir.to_string_lossy().to_string())
        .env("GOCACHE", out_dir.join(TOOL_CACHE_DIR).to_string_lossy().to_string());
    for key in ["GOROOT", "CC"] {
        if let Ok(value) = std::env::var(key)
            && !value.is_empty()
        {
            let abs = util::abs_path(Path::new(&value))?;
            go = go.env(key, abs.to_string_lossy().to_string());
        }
    }

    let listed = go.run(&["std"]).context("list standard library")?;
    let count = listed.len();
    for entry in listed {
        let pkg = entry.into_package(id_prefix);
        let out = out_dir.join(format!("{}.json", pkg.pkg_path));
        util::write_json_file(&pkg, &out)?;
    }
    fs::create_dir_all(&out_dir).with_context(|| format!("create dir {}", out_dir.display()))?;
    let marker = out_dir.join(STDLIB_MARKER);
    fs::write(&marker, b"").with_context(|| format!("write {}", marker.display()))?;
    debug!(count, out = %out_dir.display(), "wrote standard library descriptors");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_needs_four_parts() {
        let arc: Archive = "//foo:go_default_library=example.com/foo=example.com/foo=foo.a"
            .parse()
            .unwrap();
        assert_eq!(arc.label, "//foo:go_default_library");
        assert_eq!(arc.import_path, "example.com/foo");
        assert_eq!(arc.file, "foo.a");
        assert!("a=b=c".parse::<Archive>().is_err());
        assert!("a=b=c=d=e".parse::<Archive>().is_err());
    }

    #[test]
    fn test_filter_values() {
        assert_eq!("off".parse::<TestFilter>().unwrap(), TestFilter::Off);
        assert_eq!("only".parse::<TestFilter>().unwrap(), TestFilter::Only);
        assert_eq!("exclude".parse::<TestFilter>().unwrap(), TestFilter::Exclude);
        assert!("sometimes".parse::<TestFilter>().is_err());

        let test_pkg = Metadata {
            package: "foo_test".to_string(),
            ..Default::default()
        };
        let lib_pkg = Metadata {
            package: "foo".to_string(),
            ..Default::default()
        };
        assert!(TestFilter::Only.accepts(&test_pkg));
        assert!(!TestFilter::Only.accepts(&lib_pkg));
        assert!(TestFilter::Exclude.accepts(&lib_pkg));
        assert!(TestFilter::Off.accepts(&test_pkg));
    }
}
