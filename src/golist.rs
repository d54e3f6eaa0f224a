//! Package listing through the go tool, for directories outside a
//! workspace and for the standard library descriptors.

use crate::error::DriverError;
use crate::schema::{LIST_ERROR, Package, PackageError};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Environment override that stops go/packages from calling a driver,
/// this one included.
pub const DRIVER_ENV: &str = "GOPACKAGESDRIVER";

/// One object of the `go list -json` stream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListedPackage {
    pub dir: String,
    pub import_path: String,
    pub name: String,
    pub export: String,
    pub go_files: Vec<String>,
    pub cgo_files: Vec<String>,
    pub compiled_go_files: Vec<String>,
    pub c_files: Vec<String>,
    #[serde(rename = "CXXFiles")]
    pub cxx_files: Vec<String>,
    pub m_files: Vec<String>,
    pub h_files: Vec<String>,
    pub s_files: Vec<String>,
    pub syso_files: Vec<String>,
    pub imports: Vec<String>,
    pub import_map: HashMap<String, String>,
    pub dep_only: bool,
    pub error: Option<ListError>,
    pub deps_errors: Vec<ListError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListError {
    pub pos: String,
    pub err: String,
}

impl ListedPackage {
    /// Converts to a descriptor. `id_prefix` is prepended to this package's
    /// ID and to every import it references.
    pub fn into_package(self, id_prefix: &str) -> Package {
        let dir = PathBuf::from(&self.dir);
        let join = |files: &[String]| -> Vec<String> {
            files
                .iter()
                .map(|file| dir.join(file).to_string_lossy().to_string())
                .collect()
        };

        let mut go_files = join(&self.go_files);
        go_files.extend(join(&self.cgo_files));
        let compiled_go_files = if self.compiled_go_files.is_empty() {
            go_files.clone()
        } else {
            join(&self.compiled_go_files)
        };
        let other_files = [
            &self.c_files,
            &self.cxx_files,
            &self.m_files,
            &self.h_files,
            &self.s_files,
            &self.syso_files,
        ]
        .into_iter()
        .flat_map(|files| join(files))
        .collect();

        let mut imports: HashMap<String, String> = self
            .imports
            .iter()
            .map(|path| (path.clone(), path.clone()))
            .collect();
        for (source, resolved) in &self.import_map {
            imports.remove(resolved);
            imports.insert(source.clone(), resolved.clone());
        }
        imports.remove("C");

        let errors = self
            .error
            .iter()
            .chain(self.deps_errors.iter())
            .map(|err| PackageError {
                pos: err.pos.clone(),
                msg: err.err.clone(),
                kind: LIST_ERROR,
            })
            .collect();

        Package {
            id: format!("{id_prefix}{}", self.import_path),
            name: self.name,
            pkg_path: pkg_path(&self.import_path).to_string(),
            errors,
            go_files,
            compiled_go_files,
            other_files,
            export_file: (!self.export.is_empty()).then_some(self.export),
            imports: imports
                .into_iter()
                .map(|(path, id)| (path, format!("{id_prefix}{id}")))
                .collect(),
        }
    }
}

/// Import path without a test variant suffix such as ` [foo.test]`.
pub fn pkg_path(import_path: &str) -> &str {
    match import_path.find(" [") {
        Some(i) => &import_path[..i],
        None => import_path,
    }
}

/// Decodes the concatenated JSON objects `go list -json` prints.
pub fn parse_list_output(stdout: &[u8]) -> Result<Vec<ListedPackage>> {
    serde_json::Deserializer::from_slice(stdout)
        .into_iter::<ListedPackage>()
        .map(|pkg| pkg.context("decode go list output"))
        .collect()
}

/// A configured `go list` invocation.
pub struct GoList {
    bin: PathBuf,
    dir: PathBuf,
    env: Vec<(String, String)>,
    flags: Vec<String>,
}

impl GoList {
    pub fn new(bin: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            dir: dir.into(),
            env: Vec::new(),
            flags: vec!["-e".to_string(), "-json".to_string(), "-compiled=true".to_string()],
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Adds `KEY=VALUE` entries, skipping malformed ones.
    pub fn envs<S: AsRef<str>>(mut self, entries: &[S]) -> Self {
        for entry in entries {
            if let Some((key, value)) = entry.as_ref().split_once('=') {
                self.env.push((key.to_string(), value.to_string()));
            }
        }
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn flags<S: AsRef<str>>(mut self, flags: &[S]) -> Self {
        self.flags.extend(flags.iter().map(|f| f.as_ref().to_string()));
        self
    }

    pub fn run<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<ListedPackage>> {
        let patterns: Vec<&str> = patterns.iter().map(|p| p.as_ref()).collect();
        debug!(bin = %self.bin.display(), flags = ?self.flags, ?patterns, "running go list");
        let mut cmd = Command::new(&self.bin);
        cmd.arg("list")
            .args(&self.flags)
            .arg("--")
            .args(&patterns)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        // Set last so a caller-provided value cannot re-enable the driver.
        cmd.env(DRIVER_ENV, "off");
        let output = cmd
            .output()
            .with_context(|| format!("run {} list", self.bin.display()))?;
        if !output.status.success() {
            let bin = self.bin.display().to_string();
            return Err(DriverError::subprocess(&bin, "list", output.status).into());
        }
        parse_list_output(&output.stdout)
    }
}
