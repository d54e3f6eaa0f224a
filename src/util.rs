use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Path of `path` relative to `root` in slash form. Paths outside `root`
/// are normalized as given.
pub fn relative_to(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => normalize_path(rel),
        Err(_) => normalize_path(path),
    }
}

pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    let mut absolute = false;
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            _ => {}
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    Ok(())
}

/// Writes `data` as one JSON document followed by a newline.
pub fn write_json_file<T: Serialize>(data: &T, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let file = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer(&mut out, data)
        .with_context(|| format!("encode {}", path.display()))?;
    out.write_all(b"\n")?;
    out.flush()
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Absolute form of `path`, resolved against the working directory.
pub fn abs_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("get working directory")?;
    Ok(cwd.join(path))
}

/// Replaces `@file` arguments with the lines of that file.
pub fn expand_params_files(args: Vec<String>) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg.strip_prefix('@') {
            Some(path) if !path.is_empty() => {
                let content = read_to_string(Path::new(path))?;
                out.extend(
                    content
                        .lines()
                        .map(|line| line.trim_end_matches('\r'))
                        .filter(|line| !line.is_empty())
                        .map(|line| line.to_string()),
                );
            }
            _ => out.push(arg),
        }
    }
    Ok(out)
}
