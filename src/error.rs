use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Failures that abort a resolution. Raised through `anyhow` so call sites
/// can add context; use `downcast_ref::<DriverError>()` to inspect the kind.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0}")]
    Input(String),

    #[error("{tool} {command} failed: {status}")]
    Subprocess {
        tool: String,
        command: String,
        status: String,
    },

    #[error("{label} did not build successfully")]
    TargetBuild { label: String },

    #[error("malformed build event log: {0}")]
    Decode(String),

    #[error("failed to load package file {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("working directory is outside any Bazel workspace")]
    NoWorkspace,
}

impl DriverError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn subprocess(tool: &str, command: &str, status: ExitStatus) -> Self {
        Self::Subprocess {
            tool: tool.to_string(),
            command: command.to_string(),
            status: status.to_string(),
        }
    }

    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// True when `err` (or anything in its chain) is `DriverError::NoWorkspace`.
pub fn is_no_workspace(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<DriverError>(),
            Some(DriverError::NoWorkspace)
        )
    })
}
