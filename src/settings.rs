//! Engine settings, read from TOML. Every field has a default so an empty or
//! partial file is valid.

use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Read-only probes: parted print, blkid, lsblk, partprobe.
    pub probe_secs: u64,
    /// mklabel, mkpart, rm, set.
    pub table_edit_secs: u64,
    /// Filesystems that format quickly (FAT).
    pub quick_format_secs: u64,
    pub format_secs: u64,
    /// Subvolume creation and mount/umount around it.
    pub btrfs_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_secs: 10,
            table_edit_secs: 30,
            quick_format_secs: 60,
            format_secs: 120,
            btrfs_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn table_edit(&self) -> Duration {
        Duration::from_secs(self.table_edit_secs)
    }

    pub fn quick_format(&self) -> Duration {
        Duration::from_secs(self.quick_format_secs)
    }

    pub fn format(&self) -> Duration {
        Duration::from_secs(self.format_secs)
    }

    pub fn btrfs(&self) -> Duration {
        Duration::from_secs(self.btrfs_secs)
    }
}

/// How long to wait for a new partition's device node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceWait {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl Default for DeviceWait {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval_ms: 500,
        }
    }
}

impl DeviceWait {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// How long install-time replay waits for UUID/LABEL symlinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountWait {
    pub timeout_secs: u64,
    pub interval_ms: u64,
}

impl Default for MountWait {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            interval_ms: 1000,
        }
    }
}

impl MountWait {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub config_store_path: PathBuf,
    pub fstab_path: PathBuf,
    pub target_root: PathBuf,
    pub dry_run: bool,
    /// Smallest root partition a layout policy may create.
    pub min_root_bytes: u64,
    pub timeouts: Timeouts,
    pub device_wait: DeviceWait,
    pub mount_wait: MountWait,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            config_store_path: PathBuf::from(paths::CONFIG_STORE),
            fstab_path: PathBuf::from(paths::FSTAB),
            target_root: PathBuf::from(paths::TARGET_ROOT),
            dry_run: false,
            min_root_bytes: 15 * 1024 * 1024 * 1024,
            timeouts: Timeouts::default(),
            device_wait: DeviceWait::default(),
            mount_wait: MountWait::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from `path`, or from the system settings file when it exists.
    /// An explicit path must exist; the system file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::read(path)?,
            None if Path::new(paths::SETTINGS_FILE).exists() => {
                Self::read(Path::new(paths::SETTINGS_FILE))?
            }
            None => Self::default(),
        };

        if Path::new(paths::DRY_RUN_FLAG).exists() {
            settings.dry_run = true;
        }
        Ok(settings)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }
}
