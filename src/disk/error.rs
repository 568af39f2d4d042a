use std::fmt;
use thiserror::Error;

/// A requirement the partition configuration must meet before installing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRequirement {
    /// No entry is mounted at `/`.
    RootMountpoint,
    /// More than one entry claims `/`.
    DuplicateRoot,
    /// No entry is flagged bootable.
    BootablePartition,
}

impl fmt::Display for MissingRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingRequirement::RootMountpoint => write!(f, "no root (/) mountpoint configured"),
            MissingRequirement::DuplicateRoot => write!(f, "more than one root (/) mountpoint"),
            MissingRequirement::BootablePartition => write!(f, "no bootable partition"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DiskError {
    #[error("`{command}` failed (exit code {}): {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "none".into()))]
    ToolInvocation {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {seconds}s")]
    ToolTimeout { command: String, seconds: u64 },

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("could not parse {tool} output: {detail}")]
    Parse { tool: &'static str, detail: String },

    #[error("requested {requested} bytes but only {available} bytes are available")]
    InsufficientSpace { requested: u64, available: u64 },

    #[error("unsupported filesystem: {0}")]
    UnsupportedFilesystem(String),

    #[error("missing configuration: {}", join_requirements(.0))]
    MissingConfiguration(Vec<MissingRequirement>),

    #[error("{0} has no partition table")]
    NoPartitionTable(String),

    #[error("no free space matching {start}..{end} on {disk}")]
    RegionUnavailable { disk: String, start: u64, end: u64 },

    #[error("mountpoint {mountpoint} is already used by {device}")]
    MountpointInUse { mountpoint: String, device: String },

    #[error("another disk operation is already running")]
    Busy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_requirements(items: &[MissingRequirement]) -> String {
    items
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl DiskError {
    pub fn parse(tool: &'static str, detail: impl Into<String>) -> Self {
        DiskError::Parse {
            tool,
            detail: detail.into(),
        }
    }

    /// Stable identifier for front-ends that render or translate errors.
    pub fn code(&self) -> &'static str {
        match self {
            DiskError::ToolInvocation { .. } => "tool.failed",
            DiskError::ToolTimeout { .. } => "tool.timeout",
            DiskError::DeviceNotFound(_) => "device.not_found",
            DiskError::Parse { .. } => "tool.parse",
            DiskError::InsufficientSpace { .. } => "space.insufficient",
            DiskError::UnsupportedFilesystem(_) => "filesystem.unsupported",
            DiskError::MissingConfiguration(_) => "config.missing",
            DiskError::NoPartitionTable(_) => "disk.no_table",
            DiskError::RegionUnavailable { .. } => "space.region_unavailable",
            DiskError::MountpointInUse { .. } => "config.mountpoint_in_use",
            DiskError::Busy => "worker.busy",
            DiskError::Io(_) => "io",
            DiskError::Json(_) => "json",
        }
    }
}

pub type DiskResult<T> = Result<T, DiskError>;
