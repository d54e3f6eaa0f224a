//! Thin wrapper over the build tool binary.
//!
//! Every command runs in the workspace directory and blocks until the child
//! exits. Child stderr is inherited so the tool's own diagnostics reach the
//! caller as they happen.

use crate::config::Config;
use crate::error::DriverError;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

pub struct Bazel {
    bin: String,
    flags: Vec<String>,
    dir: PathBuf,
}

impl Bazel {
    pub fn new(config: &Config, dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: config.bazel_bin.clone(),
            flags: config.bazel_flags.clone(),
            dir: dir.into(),
        }
    }

    fn command(&self, verb: &str) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg(verb).args(&self.flags).current_dir(&self.dir);
        cmd
    }

    /// Runs `info` and returns its `key: value` pairs.
    pub fn info(&self) -> Result<HashMap<String, String>> {
        let output = self
            .command("info")
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("run {} info", self.bin))?;
        if !output.status.success() {
            return Err(DriverError::subprocess(&self.bin, "info", output.status).into());
        }
        Ok(parse_info(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Runs `query <flags> -- <args>` and returns raw stdout.
    pub fn query(&self, flags: &[String], args: &[String]) -> Result<Vec<u8>> {
        debug!(bin = %self.bin, ?args, "running query");
        let output = self
            .command("query")
            .args(flags)
            .arg("--")
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("run {} query", self.bin))?;
        if !output.status.success() {
            return Err(DriverError::subprocess(&self.bin, "query", output.status).into());
        }
        Ok(output.stdout)
    }

    /// Runs `build <args>`. Child stdout goes to our stderr; our stdout is
    /// reserved for the response.
    pub fn build(&self, args: &[String]) -> Result<()> {
        debug!(bin = %self.bin, ?args, "running build");
        let status = self
            .command("build")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(io::stderr()))
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("run {} build", self.bin))?;
        if !status.success() {
            return Err(DriverError::subprocess(&self.bin, "build", status).into());
        }
        Ok(())
    }
}

pub fn parse_info(output: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        values.insert(key.trim().to_string(), value.trim_end_matches('\r').to_string());
    }
    values
}
