//! Builds the resolved targets with the driver aspect and collects the
//! package descriptor files the aspect produced.
//!
//! ## Flow
//!
//! 1. Build the targets with `--aspects=<aspect>` and
//!    `--build_event_binary_file=<tmp>`
//! 2. Decode the event log: target-completed events of our aspect name the
//!    root file sets, named-set events describe the set DAG
//! 3. Walk the DAG from the roots, each set once, and return the sorted,
//!    deduplicated file names

use crate::bazel::Bazel;
use crate::bep::{BuildEvent, EventReader};
use crate::config::Config;
use crate::error::DriverError;
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use tracing::debug;

/// Output group the aspect writes descriptor files to.
pub const OUTPUT_GROUP: &str = "gopackagesdriver";

/// What the aspect has to produce beyond the root packages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Facets {
    pub deps: bool,
    pub export: bool,
    pub tests: bool,
}

/// `<aspect file>%gopackagesdriver_[deps_][export_][test_]aspect`.
pub fn aspect_name(aspect_file: &str, facets: Facets) -> String {
    let mut name = format!("{aspect_file}%gopackagesdriver_");
    if facets.deps {
        name.push_str("deps_");
    }
    if facets.export {
        name.push_str("export_");
    }
    if facets.tests {
        name.push_str("test_");
    }
    name.push_str("aspect");
    name
}

/// The named-file-set DAG of one build, plus the sets our aspect reported.
#[derive(Debug, Default)]
pub struct FileSetGraph {
    set_to_files: HashMap<String, Vec<String>>,
    set_to_sets: HashMap<String, Vec<String>>,
    roots: Vec<String>,
}

impl FileSetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, set_id: impl Into<String>) {
        self.roots.push(set_id.into());
    }

    pub fn add_set(&mut self, set_id: impl Into<String>, files: Vec<String>, children: Vec<String>) {
        let set_id = set_id.into();
        self.set_to_files.insert(set_id.clone(), files);
        self.set_to_sets.insert(set_id, children);
    }

    /// Applies one event. Completions of other aspects are ignored; a failed
    /// completion of ours aborts with `DriverError::TargetBuild`.
    pub fn record(&mut self, event: &BuildEvent, aspect: &str) -> Result<()> {
        let Some(id) = event.id.as_ref() else {
            return Ok(());
        };

        if let Some(target) = id.target_completed.as_ref() {
            if target.aspect != aspect {
                return Ok(());
            }
            let completed = event.completed.clone().unwrap_or_default();
            if !completed.success {
                return Err(DriverError::TargetBuild {
                    label: target.label.clone(),
                }
                .into());
            }
            for group in completed.output_group {
                if group.name != OUTPUT_GROUP {
                    continue;
                }
                for set in group.file_sets {
                    if !set.id.is_empty() {
                        self.add_root(set.id);
                    }
                }
            }
            return Ok(());
        }

        if let Some(set_id) = id.named_set.as_ref() {
            let set = event.named_set_of_files.clone().unwrap_or_default();
            let files = set.files.into_iter().map(|file| file.name).collect();
            let children = set.file_sets.into_iter().map(|child| child.id).collect();
            self.add_set(set_id.id.clone(), files, children);
        }
        Ok(())
    }

    /// Every file reachable from a root set, sorted. Each set is expanded at
    /// most once, so shared subtrees and cycles are harmless.
    pub fn files(&self) -> Vec<String> {
        let mut files = BTreeSet::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = self.roots.iter().rev().map(String::as_str).collect();
        while let Some(set_id) = stack.pop() {
            if !visited.insert(set_id) {
                continue;
            }
            if let Some(names) = self.set_to_files.get(set_id) {
                files.extend(names.iter().cloned());
            }
            if let Some(children) = self.set_to_sets.get(set_id) {
                stack.extend(children.iter().rev().map(String::as_str));
            }
        }
        files.into_iter().collect()
    }
}

/// Decodes a whole event log and returns the aspect's output files.
pub fn collect_output_files(log: &[u8], aspect: &str) -> Result<Vec<String>> {
    let mut graph = FileSetGraph::new();
    let mut events = 0usize;
    for event in EventReader::new(log) {
        graph.record(&event?, aspect)?;
        events += 1;
    }
    let files = graph.files();
    debug!(
        events,
        roots = graph.roots.len(),
        files = files.len(),
        "decoded build event log"
    );
    Ok(files)
}

/// Builds `targets` (and the stdlib pseudo-target when asked) with the
/// driver aspect and returns the descriptor files, relative to bazel-bin.
pub fn build_package_files(
    bazel: &Bazel,
    config: &Config,
    facets: Facets,
    flags: &[String],
    targets: &[String],
    include_stdlib: bool,
) -> Result<Vec<String>> {
    if targets.is_empty() && !include_stdlib {
        return Ok(Vec::new());
    }

    // Removed on drop, whichever way this function returns.
    let log_path = tempfile::Builder::new()
        .prefix("gopackagesdriver")
        .suffix(".bep")
        .tempfile()
        .context("create build event log file")?
        .into_temp_path();

    let aspect = aspect_name(&config.aspect_file(), facets);
    let mut args = vec![
        "--spawn_strategy=standalone".to_string(),
        format!("--aspects={aspect}"),
        format!("--output_groups={OUTPUT_GROUP}"),
        format!("--build_event_binary_file={}", log_path.display()),
    ];
    args.extend(flags.iter().cloned());
    args.push("--".to_string());
    args.extend(targets.iter().cloned());
    if include_stdlib {
        args.push(config.stdlib_target());
    }
    bazel.build(&args)?;

    let log = fs::read(&log_path)
        .with_context(|| format!("read build event log {}", log_path.display()))?;
    collect_output_files(&log, &aspect)
}
