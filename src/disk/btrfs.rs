//! Standard Btrfs subvolume layout.

use super::error::DiskResult;
use super::parsing::{find_subvolume_id, parse_subvolume_list};
use crate::execution::retry::Clock;
use crate::execution::{CommandRunner, ToolCommand};
use crate::settings::Timeouts;
use crate::ui::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// Subvolume name -> mountpoint, applied to a Btrfs root.
pub const SUBVOLUME_PLAN: [(&str, &str); 5] = [
    ("@", "/"),
    ("@home", "/home"),
    ("@var", "/var"),
    ("@tmp", "/tmp"),
    ("@snapshots", "/.snapshots"),
];

pub const ROOT_SUBVOLUME: &str = "@";

const SETTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub created: Vec<String>,
    pub default_subvolume_id: Option<u64>,
    pub warnings: Vec<String>,
}

pub struct BtrfsSubvolumeProvisioner<'a> {
    runner: &'a dyn CommandRunner,
    clock: &'a dyn Clock,
    timeouts: &'a Timeouts,
}

impl<'a> BtrfsSubvolumeProvisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, clock: &'a dyn Clock, timeouts: &'a Timeouts) -> Self {
        Self {
            runner,
            clock,
            timeouts,
        }
    }

    fn command(&self, program: &str) -> ToolCommand {
        ToolCommand::new(program).timeout(self.timeouts.btrfs())
    }

    fn warn(&self, report: &mut ProvisionReport, code: &str, message: String) {
        emit(Level::Warn, code, &message, None);
        report.warnings.push(message);
    }

    /// Mount `device` on a scratch directory, create the subvolume plan, make
    /// `@` the default and unmount. Only a failed mount is an error; every
    /// later step degrades to a warning so the partition stays usable.
    pub fn provision(&self, device: &str) -> DiskResult<ProvisionReport> {
        let scratch = tempfile::Builder::new()
            .prefix("diskwright-btrfs-")
            .tempdir()?;
        let mountpoint = scratch.path().to_string_lossy().into_owned();

        self.runner.run_checked(
            &self
                .command("mount")
                .args([device, mountpoint.as_str()])
                .mutating(),
        )?;

        let mut report = ProvisionReport::default();
        self.create_subvolumes(&mountpoint, &mut report);
        self.set_default(&mountpoint, &mut report);

        self.clock.sleep(SETTLE_DELAY);
        let umount = self
            .command("umount")
            .arg(mountpoint.as_str())
            .mutating();
        match self.runner.run_checked(&umount) {
            Ok(_) => drop(scratch),
            Err(err) => {
                // Still mounted: removing the directory tree would delete
                // the new filesystem's contents.
                let _ = scratch.keep();
                self.warn(
                    &mut report,
                    "btrfs.umount.failed",
                    format!("Could not unmount {mountpoint}: {err}"),
                );
            }
        }

        emit(
            Level::Success,
            "btrfs.provisioned",
            &format!("Created {} Btrfs subvolumes on {device}", report.created.len()),
            Some(json!({ "device": device, "subvolumes": report.created })),
        );
        Ok(report)
    }

    fn create_subvolumes(&self, mountpoint: &str, report: &mut ProvisionReport) {
        for (name, _) in SUBVOLUME_PLAN {
            let path = Path::new(mountpoint).join(name);
            let create = self
                .command("btrfs")
                .args(["subvolume", "create"])
                .arg(path.to_string_lossy())
                .mutating();
            match self.runner.run_checked(&create) {
                Ok(_) => report.created.push(name.to_string()),
                Err(err) => self.warn(
                    report,
                    "btrfs.subvolume.failed",
                    format!("Failed to create subvolume {name}: {err}"),
                ),
            }
        }
    }

    fn set_default(&self, mountpoint: &str, report: &mut ProvisionReport) {
        if self.runner.dry_run() {
            emit(
                Level::Info,
                "exec.dry_run",
                &format!("[DRY RUN] btrfs subvolume set-default <id of {ROOT_SUBVOLUME}> {mountpoint}"),
                None,
            );
            return;
        }

        let list = self
            .command("btrfs")
            .args(["subvolume", "list", mountpoint]);
        let id = self
            .runner
            .run_checked(&list)
            .and_then(|output| parse_subvolume_list(&output.stdout))
            .map(|subvolumes| find_subvolume_id(&subvolumes, ROOT_SUBVOLUME));

        let id = match id {
            Ok(Some(id)) => id,
            Ok(None) => {
                return self.warn(
                    report,
                    "btrfs.default.missing",
                    format!("Subvolume {ROOT_SUBVOLUME} not found; default left unchanged"),
                );
            }
            Err(err) => {
                return self.warn(
                    report,
                    "btrfs.list.failed",
                    format!("Could not list subvolumes: {err}"),
                );
            }
        };

        let set_default = self
            .command("btrfs")
            .args(["subvolume", "set-default"])
            .args([id.to_string(), mountpoint.to_string()])
            .mutating();
        match self.runner.run_checked(&set_default) {
            Ok(_) => report.default_subvolume_id = Some(id),
            Err(err) => self.warn(
                report,
                "btrfs.default.failed",
                format!("Could not set default subvolume: {err}"),
            ),
        }
    }
}
