//! Wire types shared by the driver and the package descriptor builder.
//!
//! The JSON shape follows the go/packages driver protocol: requests use
//! snake_case keys, responses and package descriptors use the Go field names.
//! Both binaries read and write these types, so a descriptor written by
//! `gopkg pkg` is exactly what the driver loads back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bitmask of the information a go/packages caller needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadMode(pub u64);

impl LoadMode {
    pub const NEED_NAME: LoadMode = LoadMode(1 << 0);
    pub const NEED_FILES: LoadMode = LoadMode(1 << 1);
    pub const NEED_COMPILED_GO_FILES: LoadMode = LoadMode(1 << 2);
    pub const NEED_IMPORTS: LoadMode = LoadMode(1 << 3);
    pub const NEED_DEPS: LoadMode = LoadMode(1 << 4);
    pub const NEED_EXPORT_FILE: LoadMode = LoadMode(1 << 5);
    pub const NEED_TYPES: LoadMode = LoadMode(1 << 6);
    pub const NEED_SYNTAX: LoadMode = LoadMode(1 << 7);
    pub const NEED_TYPES_INFO: LoadMode = LoadMode(1 << 8);
    pub const NEED_TYPES_SIZES: LoadMode = LoadMode(1 << 9);

    pub fn contains(self, other: LoadMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: LoadMode) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for LoadMode {
    type Output = LoadMode;

    fn bitor(self, rhs: LoadMode) -> LoadMode {
        LoadMode(self.0 | rhs.0)
    }
}

/// Request read from stdin when the driver is invoked by go/packages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub mode: LoadMode,
    /// `KEY=VALUE` entries the caller wants the build to see.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub build_flags: Vec<String>,
    #[serde(default)]
    pub tests: bool,
    /// File path to base64 content. Accepted but not applied to builds.
    #[serde(default)]
    pub overlay: BTreeMap<String, String>,
}

impl DriverRequest {
    /// Looks up `key` in the request environment, last entry wins.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.iter().rev().find_map(|entry| {
            let (name, value) = entry.split_once('=')?;
            (name == key).then_some(value)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sizes {
    pub word_size: i64,
    pub max_align: i64,
}

impl Sizes {
    /// gc type sizes for a target architecture.
    pub fn for_arch(goarch: &str) -> Self {
        let word_size = match goarch {
            "386" | "arm" | "armbe" | "mips" | "mipsle" | "ppc" | "s390" | "sparc" => 4,
            _ => 8,
        };
        Self {
            word_size,
            max_align: word_size,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriverResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Sizes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<String>,
    #[serde(default)]
    pub packages: Vec<Package>,
}

/// One compilation unit, as reported to go/packages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Package {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pkg_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PackageError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub go_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compiled_go_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_file: Option<String>,
    /// Import path to the ID of the package it resolves to.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub imports: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageError {
    #[serde(default)]
    pub pos: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub kind: i32,
}

/// go/packages error kind for failures reported by the listing tool.
pub const LIST_ERROR: i32 = 1;
