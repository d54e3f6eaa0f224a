use crate::bazel::Bazel;
use crate::config::Config;
use crate::error::DriverError;
use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Files marking the root of a Bazel workspace.
pub const WORKSPACE_MARKERS: &[&str] = &["WORKSPACE", "WORKSPACE.bazel", "MODULE.bazel"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BazelDirs {
    pub workspace_root: PathBuf,
    pub bin_dir: PathBuf,
    pub exec_root: PathBuf,
}

/// Walks upward from `start` to the first directory holding a marker.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        if WORKSPACE_MARKERS
            .iter()
            .any(|marker| current.join(marker).is_file())
        {
            return Some(current.to_path_buf());
        }
        dir = current.parent();
    }
    None
}

/// Locates the workspace around `cwd` and asks the build tool for its
/// output directories. Fails with `DriverError::NoWorkspace` outside one.
pub fn discover(config: &Config, cwd: &Path) -> Result<BazelDirs> {
    let workspace_root = find_workspace_root(cwd).ok_or(DriverError::NoWorkspace)?;
    debug!(root = %workspace_root.display(), "found workspace");
    let info = Bazel::new(config, &workspace_root).info()?;
    let lookup = |key: &str| {
        info.get(key)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("{} info did not report {key}", config.bazel_bin))
    };
    let bin_dir = lookup("bazel-bin")?;
    let exec_root = lookup("execution_root")?;
    let workspace_root = lookup("workspace").unwrap_or(workspace_root);
    Ok(BazelDirs {
        workspace_root,
        bin_dir,
        exec_root,
    })
}
