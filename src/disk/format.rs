use super::error::{DiskError, DiskResult};
use crate::execution::{CommandRunner, ToolCommand};
use crate::settings::Timeouts;
use crate::ui::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Filesystems the formatter knows how to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    Ext4,
    Btrfs,
    Xfs,
    F2fs,
    Vfat,
    Ntfs,
    Exfat,
    Swap,
}

impl Filesystem {
    pub const ALL: [Filesystem; 8] = [
        Filesystem::Ext4,
        Filesystem::Btrfs,
        Filesystem::Xfs,
        Filesystem::F2fs,
        Filesystem::Vfat,
        Filesystem::Ntfs,
        Filesystem::Exfat,
        Filesystem::Swap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Filesystem::Ext4 => "ext4",
            Filesystem::Btrfs => "btrfs",
            Filesystem::Xfs => "xfs",
            Filesystem::F2fs => "f2fs",
            Filesystem::Vfat => "vfat",
            Filesystem::Ntfs => "ntfs",
            Filesystem::Exfat => "exfat",
            Filesystem::Swap => "swap",
        }
    }

    /// Program that creates this filesystem.
    pub fn program(&self) -> &'static str {
        match self {
            Filesystem::Ext4 => "mkfs.ext4",
            Filesystem::Btrfs => "mkfs.btrfs",
            Filesystem::Xfs => "mkfs.xfs",
            Filesystem::F2fs => "mkfs.f2fs",
            Filesystem::Vfat => "mkfs.fat",
            Filesystem::Ntfs => "mkfs.ntfs",
            Filesystem::Exfat => "mkfs.exfat",
            Filesystem::Swap => "mkswap",
        }
    }

    /// Force/overwrite arguments placed before the device.
    fn program_args(&self) -> &'static [&'static str] {
        match self {
            Filesystem::Ext4 => &["-F"],
            Filesystem::Btrfs | Filesystem::Xfs | Filesystem::F2fs | Filesystem::Ntfs => &["-f"],
            Filesystem::Vfat => &["-F", "32"],
            Filesystem::Exfat | Filesystem::Swap => &[],
        }
    }

    /// Type hint passed to `parted mkpart`, when parted knows the filesystem.
    pub fn parted_type(&self) -> Option<&'static str> {
        match self {
            Filesystem::Ext4 => Some("ext4"),
            Filesystem::Btrfs => Some("btrfs"),
            Filesystem::Xfs => Some("xfs"),
            Filesystem::F2fs => Some("f2fs"),
            Filesystem::Vfat => Some("fat32"),
            Filesystem::Ntfs => Some("ntfs"),
            Filesystem::Swap => Some("linux-swap"),
            Filesystem::Exfat => None,
        }
    }

    pub fn timeout(&self, timeouts: &Timeouts) -> Duration {
        match self {
            Filesystem::Vfat | Filesystem::Swap => timeouts.quick_format(),
            _ => timeouts.format(),
        }
    }

    pub fn format_command(&self, device: &str, timeouts: &Timeouts) -> ToolCommand {
        ToolCommand::new(self.program())
            .args(self.program_args().iter().copied())
            .arg(device)
            .timeout(self.timeout(timeouts))
            .mutating()
    }
}

impl FromStr for Filesystem {
    type Err = DiskError;

    fn from_str(s: &str) -> DiskResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ext4" => Ok(Filesystem::Ext4),
            "btrfs" => Ok(Filesystem::Btrfs),
            "xfs" => Ok(Filesystem::Xfs),
            "f2fs" => Ok(Filesystem::F2fs),
            "vfat" | "fat32" | "fat" => Ok(Filesystem::Vfat),
            "ntfs" => Ok(Filesystem::Ntfs),
            "exfat" => Ok(Filesystem::Exfat),
            "swap" | "linux-swap" => Ok(Filesystem::Swap),
            _ => Err(DiskError::UnsupportedFilesystem(s.to_string())),
        }
    }
}

impl std::fmt::Display for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a requested filesystem where `"unformatted"` means leave it raw.
pub fn parse_requested(name: &str) -> DiskResult<Option<Filesystem>> {
    if name.trim().eq_ignore_ascii_case("unformatted") {
        Ok(None)
    } else {
        name.parse().map(Some)
    }
}

pub fn format_partition(
    runner: &dyn CommandRunner,
    device: &str,
    fs: Filesystem,
    timeouts: &Timeouts,
) -> DiskResult<()> {
    emit(
        Level::Info,
        "disk.format.start",
        &format!("Formatting {device} as {fs}..."),
        None,
    );
    runner.run_checked(&fs.format_command(device, timeouts))?;
    emit(
        Level::Success,
        "disk.format.done",
        &format!("Formatted {device} as {fs}"),
        None,
    );
    Ok(())
}
