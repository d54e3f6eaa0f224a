//! Request orchestration for the driver binary.
//!
//! patterns -> workspace? -> query -> aspect build -> load + canonicalize,
//! or the go tool when no workspace surrounds the working directory.

use crate::assemble;
use crate::bazel::Bazel;
use crate::config::Config;
use crate::constraint::BuildContext;
use crate::error::is_no_workspace;
use crate::fallback;
use crate::golist::GoList;
use crate::harvest::{self, Facets};
use crate::pattern;
use crate::resolver;
use crate::schema::{DriverRequest, DriverResponse, LoadMode, Sizes};
use crate::workspace;
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything a listing needs besides the patterns.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub facets: Facets,
    pub build_flags: Vec<String>,
    /// `KEY=VALUE` entries forwarded to the go tool on the fallback path.
    pub env: Vec<String>,
    pub goarch: String,
}

impl ListOptions {
    pub fn from_request(request: &DriverRequest) -> Self {
        let goarch = request
            .env_var("GOARCH")
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_goarch);
        Self {
            facets: facets_from_request(request),
            build_flags: request.build_flags.clone(),
            env: request.env.clone(),
            goarch,
        }
    }
}

/// `GOARCH` from the process environment, else the host architecture.
pub fn default_goarch() -> String {
    env::var("GOARCH")
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| BuildContext::default().goarch)
}

pub fn facets_from_request(request: &DriverRequest) -> Facets {
    Facets {
        deps: request.mode.contains(LoadMode::NEED_DEPS),
        export: request
            .mode
            .intersects(LoadMode::NEED_EXPORT_FILE | LoadMode::NEED_TYPES),
        tests: request.tests,
    }
}

/// Answers one go/packages request.
pub fn run_request<S: AsRef<str>>(
    config: &Config,
    cwd: &Path,
    request: &DriverRequest,
    patterns: &[S],
) -> Result<DriverResponse> {
    if !request.overlay.is_empty() {
        warn!(
            files = request.overlay.len(),
            "overlays are not supported, using files on disk"
        );
    }
    list(config, cwd, &ListOptions::from_request(request), patterns)
}

pub fn list<S: AsRef<str>>(
    config: &Config,
    cwd: &Path,
    opts: &ListOptions,
    patterns: &[S],
) -> Result<DriverResponse> {
    let parsed = pattern::parse_patterns(patterns)?;
    debug!(
        files = parsed.files.len(),
        patterns = parsed.patterns.len(),
        stdlib = parsed.stdlib.len(),
        "parsed patterns"
    );

    let dirs = match workspace::discover(config, cwd) {
        Ok(dirs) => dirs,
        Err(err) if is_no_workspace(&err) => {
            debug!(cwd = %cwd.display(), "no workspace, listing with the go tool");
            let go = GoList::new(&config.go_bin, cwd).envs(&opts.env);
            let mut response =
                fallback::list_fallback(go, opts.facets, &opts.build_flags, patterns)?;
            response.sizes = Some(Sizes::for_arch(&opts.goarch));
            return Ok(response);
        }
        Err(err) => return Err(err).context("discover workspace"),
    };

    let bazel = Bazel::new(config, &dirs.workspace_root);
    let query_flags: Vec<String> = config
        .query_flags
        .iter()
        .chain(&opts.build_flags)
        .cloned()
        .collect();
    let targets = resolver::resolve_targets(
        &bazel,
        &dirs.workspace_root,
        &query_flags,
        &parsed.files,
        &parsed.patterns,
    )
    .context("resolve targets")?;

    let build_flags: Vec<String> = opts
        .build_flags
        .iter()
        .chain(&config.build_flags)
        .cloned()
        .collect();
    let include_stdlib = !parsed.stdlib.is_empty();
    let files = harvest::build_package_files(
        &bazel,
        config,
        opts.facets,
        &build_flags,
        &targets,
        include_stdlib,
    )
    .context("build package descriptors")?;

    let paths: Vec<PathBuf> = files.iter().map(|file| dirs.bin_dir.join(file)).collect();
    let mut packages = assemble::load_package_files(&paths)?;
    for pkg in &mut packages {
        assemble::canonicalize_package(pkg, &dirs.workspace_root, &dirs.exec_root);
    }

    let mut roots = targets;
    if include_stdlib {
        let prefix = config.stdlib_id_prefix();
        roots.extend(
            packages
                .iter()
                .filter(|pkg| pkg.id.starts_with(&prefix))
                .map(|pkg| pkg.id.clone()),
        );
    }
    debug!(
        roots = roots.len(),
        packages = packages.len(),
        "assembled response"
    );

    Ok(DriverResponse {
        sizes: Some(Sizes::for_arch(&opts.goarch)),
        roots,
        packages,
    })
}
