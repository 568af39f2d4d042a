//! Install-time replay of the generated fstab onto a target root.

use super::error::{DiskError, DiskResult};
use super::parsing::{BtrfsSelector, FstabEntry, parse_fstab};
use super::probe::BlkidProbe;
use crate::execution::host::HostFs;
use crate::execution::retry::{Clock, wait_for};
use crate::execution::{CommandRunner, ToolCommand};
use crate::paths;
use crate::settings::EngineSettings;
use crate::ui::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountedEntry {
    pub device: String,
    pub target: PathBuf,
    pub fstype: String,
    pub option: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MountReport {
    pub mounted: Vec<MountedEntry>,
    pub warnings: Vec<String>,
}

impl MountReport {
    fn warn(&mut self, code: &str, message: String) {
        emit(Level::Warn, code, &message, None);
        self.warnings.push(message);
    }
}

/// Directory a `UUID=`/`LABEL=`/`PARTUUID=` tag resolves through.
fn tag_path(spec: &str) -> Option<PathBuf> {
    [
        ("UUID=", paths::BY_UUID),
        ("LABEL=", paths::BY_LABEL),
        ("PARTUUID=", paths::BY_PARTUUID),
    ]
    .into_iter()
    .find_map(|(prefix, dir)| {
        spec.strip_prefix(prefix)
            .map(|value| Path::new(dir).join(value))
    })
}

pub struct DeviceResolutionMounter<'a> {
    runner: &'a dyn CommandRunner,
    host: &'a dyn HostFs,
    clock: &'a dyn Clock,
    settings: &'a EngineSettings,
}

impl<'a> DeviceResolutionMounter<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        host: &'a dyn HostFs,
        clock: &'a dyn Clock,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            runner,
            host,
            clock,
            settings,
        }
    }

    /// Turn an fstab spec into a block device path, waiting for udev to
    /// create the symlink and falling back to `blkid -U` for UUIDs.
    pub fn resolve(&self, spec: &str) -> Option<String> {
        let wait = &self.settings.mount_wait;
        let candidate = tag_path(spec).unwrap_or_else(|| PathBuf::from(spec));

        let found = wait_for(self.clock, wait.timeout(), wait.interval(), || {
            self.host.exists(&candidate).then(|| candidate.clone())
        });

        let device = match found {
            Some(path) => path.to_string_lossy().into_owned(),
            None => {
                let uuid = spec.strip_prefix("UUID=")?;
                emit(
                    Level::Debug,
                    "mount.resolve.blkid",
                    &format!("{} never appeared; asking blkid", candidate.display()),
                    None,
                );
                BlkidProbe::new(self.runner, self.settings.timeouts.probe()).device_for_uuid(uuid)?
            }
        };

        self.host
            .is_block_device(Path::new(&device))
            .then_some(device)
    }

    fn mount_command(&self, fstype: Option<&str>, option: Option<&str>, device: &str, target: &Path) -> ToolCommand {
        let mut command = ToolCommand::new("mount")
            .timeout(self.settings.mount_wait.timeout())
            .mutating();
        if let Some(fstype) = fstype {
            command = command.args(["-t", fstype]);
        }
        if let Some(option) = option {
            command = command.args(["-o", option]);
        }
        command.arg(device).arg(target.to_string_lossy())
    }

    /// Mount one entry with the logic its filesystem type needs.
    fn mount_entry(&self, entry: &FstabEntry, device: &str, target: &Path) -> DiskResult<MountedEntry> {
        self.host.create_dir_all(target)?;

        let mut option = None;
        let fstype = entry.fstype.as_str();
        match fstype {
            "btrfs" => {
                option = entry.btrfs_selector().mount_option();
                self.runner.run_checked(&self.mount_command(
                    Some("btrfs"),
                    option.as_deref(),
                    device,
                    target,
                ))?;
            }
            "ext2" | "ext3" | "ext4" | "xfs" | "f2fs" | "jfs" | "reiserfs" | "vfat" | "msdos" => {
                self.runner
                    .run_checked(&self.mount_command(Some(fstype), None, device, target))?;
            }
            "ntfs" | "ntfs-3g" => {
                let kernel = self.mount_command(Some("ntfs3"), None, device, target);
                if self.runner.run_checked(&kernel).is_err() {
                    emit(
                        Level::Info,
                        "mount.ntfs.fallback",
                        "ntfs3 driver failed, trying ntfs-3g",
                        None,
                    );
                    self.runner
                        .run_checked(&self.mount_command(Some("ntfs-3g"), None, device, target))?;
                }
            }
            _ => {
                self.runner
                    .run_checked(&self.mount_command(None, None, device, target))?;
            }
        }

        Ok(MountedEntry {
            device: device.to_string(),
            target: target.to_path_buf(),
            fstype: entry.fstype.clone(),
            option,
        })
    }

    /// Mount root, its Btrfs siblings, `/boot` and `/boot/efi` under `target`.
    /// Only an unresolvable or unmountable root is an error.
    pub fn mount_target(&self, fstab: &str, target: &Path) -> DiskResult<MountReport> {
        let entries = parse_fstab(fstab);
        let root = entries
            .iter()
            .find(|e| e.mountpoint == "/")
            .ok_or_else(|| DiskError::DeviceNotFound("root (/) entry in fstab".to_string()))?;

        let root_device = self
            .resolve(&root.spec)
            .ok_or_else(|| DiskError::DeviceNotFound(root.spec.clone()))?;

        let mut report = MountReport::default();
        let mounted = self.mount_entry(root, &root_device, target)?;
        emit(
            Level::Success,
            "mount.root",
            &format!("Mounted {root_device} at {}", target.display()),
            Some(json!({ "device": root_device, "option": mounted.option })),
        );
        report.mounted.push(mounted);

        if root.is_btrfs() {
            self.mount_subvolumes(&entries, root, &root_device, target, &mut report);
        }

        self.mount_boot(&entries, root, target, "/boot", &mut report);
        self.mount_boot(&entries, root, target, "/boot/efi", &mut report);
        Ok(report)
    }

    fn mount_subvolumes(
        &self,
        entries: &[FstabEntry],
        root: &FstabEntry,
        root_device: &str,
        target: &Path,
        report: &mut MountReport,
    ) {
        let siblings = entries
            .iter()
            .filter(|e| e.is_btrfs() && e.spec == root.spec && e.mountpoint != "/");
        for entry in siblings {
            if entry.btrfs_selector() == BtrfsSelector::TopLevel {
                report.warn(
                    "mount.subvolume.skipped",
                    format!(
                        "{} has neither subvol= nor subvolid=; not mounting the top level again",
                        entry.mountpoint
                    ),
                );
                continue;
            }
            let at = paths::under_root(target, &entry.mountpoint);
            match self.mount_entry(entry, root_device, &at) {
                Ok(mounted) => report.mounted.push(mounted),
                Err(err) => report.warn(
                    "mount.subvolume.failed",
                    format!("Failed to mount {} subvolume: {err}", entry.mountpoint),
                ),
            }
        }
    }

    fn mount_boot(
        &self,
        entries: &[FstabEntry],
        root: &FstabEntry,
        target: &Path,
        mountpoint: &str,
        report: &mut MountReport,
    ) {
        let Some(entry) = entries.iter().find(|e| e.mountpoint == mountpoint) else {
            if mountpoint == "/boot" {
                let boot_dir = paths::under_root(target, mountpoint);
                if root.is_btrfs() && self.host.exists(&boot_dir) {
                    emit(
                        Level::Info,
                        "mount.boot.on_root",
                        "No separate /boot entry; /boot lives inside the root subvolume",
                        None,
                    );
                } else {
                    report.warn(
                        "mount.boot.absent",
                        "No /boot entry in fstab; boot files must live on the root filesystem"
                            .to_string(),
                    );
                }
            }
            return;
        };

        // A Btrfs /boot on the root device was handled with the subvolumes.
        if entry.is_btrfs() && root.is_btrfs() && entry.spec == root.spec {
            return;
        }

        let Some(device) = self.resolve(&entry.spec) else {
            return report.warn(
                "mount.boot.unresolved",
                format!("Could not find {mountpoint} device {}", entry.spec),
            );
        };

        let at = paths::under_root(target, mountpoint);
        match self.mount_entry(entry, &device, &at) {
            Ok(mounted) => {
                emit(
                    Level::Success,
                    "mount.boot",
                    &format!("Mounted {device} at {}", at.display()),
                    None,
                );
                report.mounted.push(mounted);
            }
            Err(err) => report.warn(
                "mount.boot.failed",
                format!("Failed to mount {mountpoint}: {err}"),
            ),
        }
    }
}
