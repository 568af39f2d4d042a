//! Carving partitions out of free space.

use super::boot_mode::BootMode;
use super::btrfs::{BtrfsSubvolumeProvisioner, ProvisionReport};
use super::error::{DiskError, DiskResult};
use super::format::{Filesystem, format_partition};
use super::free_space::{self, RegionSelection, TableScan};
use super::naming;
use super::parsing::PartedListing;
use super::size::SizeSpec;
use super::types::{FreeSpaceRegion, PartitionTableType, align_down, align_up, format_size};
use crate::execution::host::HostFs;
use crate::execution::retry::{Clock, retry};
use crate::execution::{CommandRunner, ToolCommand};
use crate::settings::EngineSettings;
use crate::ui::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::path::Path;

/// Sector-aligned boundaries of a partition to create, `[start_byte, end_byte)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    pub start_byte: u64,
    pub end_byte: u64,
}

impl PartitionPlan {
    pub fn size_bytes(&self) -> u64 {
        self.end_byte - self.start_byte
    }

    /// `mkpart` arguments; parted treats the end offset as inclusive.
    fn mkpart_range(&self) -> [String; 2] {
        [
            format!("{}B", self.start_byte),
            format!("{}B", self.end_byte - 1),
        ]
    }
}

/// Align `region` to `sector` and fit `size` into it.
pub fn plan_partition(
    region: FreeSpaceRegion,
    size: SizeSpec,
    sector: u64,
) -> DiskResult<PartitionPlan> {
    let start = align_up(region.start_byte, sector);
    let region_end = align_down(region.end_byte, sector);
    let available = region_end.saturating_sub(start);

    let end = match size {
        SizeSpec::All => region_end,
        SizeSpec::Bytes(requested) => {
            if requested > available {
                return Err(DiskError::InsufficientSpace {
                    requested,
                    available,
                });
            }
            align_down(start + requested, sector)
        }
    };

    if end <= start {
        return Err(DiskError::InsufficientSpace {
            requested: size.bytes().unwrap_or(sector),
            available,
        });
    }
    Ok(PartitionPlan {
        start_byte: start,
        end_byte: end,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRequest {
    pub disk: String,
    pub size: SizeSpec,
    /// `None` leaves the partition unformatted.
    pub fstype: Option<Filesystem>,
    pub mountpoint: Option<String>,
    pub bootable: bool,
    pub region: RegionSelection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedPartition {
    pub device: String,
    pub number: u32,
    pub plan: PartitionPlan,
    pub fstype: Option<Filesystem>,
    pub provision: Option<ProvisionReport>,
}

/// Runs the partition-table tool, waits for device nodes and hands new
/// partitions to the formatter. Touches the disk only; the config store is
/// the session's business.
pub struct PartitionPlanner<'a> {
    runner: &'a dyn CommandRunner,
    host: &'a dyn HostFs,
    clock: &'a dyn Clock,
    settings: &'a EngineSettings,
    boot_mode: BootMode,
}

impl<'a> PartitionPlanner<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        host: &'a dyn HostFs,
        clock: &'a dyn Clock,
        settings: &'a EngineSettings,
        boot_mode: BootMode,
    ) -> Self {
        Self {
            runner,
            host,
            clock,
            settings,
            boot_mode,
        }
    }

    pub fn boot_mode(&self) -> BootMode {
        self.boot_mode
    }

    pub fn dry_run(&self) -> bool {
        self.runner.dry_run()
    }

    fn parted(&self, disk: &str) -> ToolCommand {
        ToolCommand::new("parted")
            .args(["-s", disk])
            .timeout(self.settings.timeouts.table_edit())
            .mutating()
    }

    pub fn scan(&self, disk: &str) -> DiskResult<TableScan> {
        free_space::scan(self.runner, disk, self.settings.timeouts.probe())
    }

    /// Ask the kernel to re-read the table. Failure only delays node creation,
    /// so it is reported and otherwise ignored.
    pub fn rescan(&self, disk: &str) {
        let command = ToolCommand::new("partprobe")
            .arg(disk)
            .timeout(self.settings.timeouts.probe())
            .mutating();
        if let Err(err) = self.runner.run_checked(&command) {
            emit(
                Level::Warn,
                "disk.rescan.failed",
                &format!("Could not re-read partition table on {disk}: {err}"),
                None,
            );
        }
    }

    /// Write a new, empty partition table. Every existing partition is lost.
    pub fn create_table(&self, disk: &str, table: PartitionTableType) -> DiskResult<()> {
        if table == PartitionTableType::Unknown {
            return Err(DiskError::parse("partition table", "unknown table type"));
        }
        self.runner
            .run_checked(&self.parted(disk).args(["mklabel", table.label()]))?;
        self.rescan(disk);
        emit(
            Level::Success,
            "disk.table.created",
            &format!("Created {table} partition table on {disk}"),
            Some(json!({ "disk": disk, "table": table })),
        );
        Ok(())
    }

    /// Current listing, creating the boot mode's table type first if the
    /// disk has none.
    pub fn listing_with_table(&self, disk: &str) -> DiskResult<PartedListing> {
        match self.scan(disk)? {
            TableScan::Table(listing) => Ok(listing),
            TableScan::NoPartitionTable => {
                emit(
                    Level::Info,
                    "disk.table.missing",
                    &format!(
                        "{disk} has no partition table; creating {}",
                        self.boot_mode.partition_table()
                    ),
                    None,
                );
                self.create_table(disk, self.boot_mode.partition_table())?;
                if self.runner.dry_run() {
                    return Ok(PartedListing::empty(self.boot_mode.partition_table()));
                }
                free_space::require_table(self.runner, disk, self.settings.timeouts.probe())
            }
        }
    }

    pub fn create_partition(&self, request: &PartitionRequest) -> DiskResult<CreatedPartition> {
        let disk = request.disk.as_str();
        let listing = self.listing_with_table(disk)?;
        let region = free_space::select_region(&listing, disk, request.region)?;
        let plan = plan_partition(region, request.size, listing.sector_size)?;

        emit(
            Level::Info,
            "disk.partition.create",
            &format!(
                "Creating {} partition on {disk} at {}..{}",
                format_size(plan.size_bytes()),
                plan.start_byte,
                plan.end_byte
            ),
            None,
        );

        let mut mkpart = self.parted(disk).args(["mkpart", "primary"]);
        if let Some(hint) = request.fstype.and_then(|fs| fs.parted_type()) {
            mkpart = mkpart.arg(hint);
        }
        self.runner.run_checked(&mkpart.args(plan.mkpart_range()))?;
        self.rescan(disk);

        let before = listing.partition_numbers();
        let (device, number) = self.wait_for_new_partition(disk, &before)?;

        if let Some(fs) = request.fstype {
            format_partition(self.runner, &device, fs, &self.settings.timeouts)?;
        }
        if request.bootable {
            self.set_boot_flag(disk, number)?;
        }

        let provision = match request.fstype {
            Some(Filesystem::Btrfs) if request.mountpoint.as_deref() == Some("/") => {
                self.provision_btrfs(&device)
            }
            _ => None,
        };

        emit(
            Level::Success,
            "disk.partition.created",
            &format!("Created {device}"),
            Some(json!({
                "device": device,
                "start_byte": plan.start_byte,
                "end_byte": plan.end_byte,
                "fstype": request.fstype,
            })),
        );
        Ok(CreatedPartition {
            device,
            number,
            plan,
            fstype: request.fstype,
            provision,
        })
    }

    /// Poll the table until a partition number that was not there before shows
    /// up and its device node exists.
    fn wait_for_new_partition(&self, disk: &str, before: &[u32]) -> DiskResult<(String, u32)> {
        if self.runner.dry_run() {
            let number = before.iter().max().map_or(1, |n| n + 1);
            return Ok((naming::get_partition_path(disk, number)?, number));
        }

        let wait = &self.settings.device_wait;
        retry(self.clock, wait.attempts, wait.interval(), |_| {
            let listing =
                free_space::require_table(self.runner, disk, self.settings.timeouts.probe())?;
            // Only a number absent from the earlier listing is ours; an
            // existing partition must never be handed to the formatter.
            let number = listing
                .partition_numbers()
                .into_iter()
                .filter(|n| !before.contains(n))
                .max()
                .ok_or_else(|| DiskError::DeviceNotFound(format!("new partition on {disk}")))?;

            let device = naming::get_partition_path(disk, number)?;
            if self.host.exists(Path::new(&device)) {
                Ok((device, number))
            } else {
                Err(DiskError::DeviceNotFound(device))
            }
        })
    }

    pub fn set_boot_flag(&self, disk: &str, number: u32) -> DiskResult<()> {
        let flag = self.boot_mode.boot_flag();
        self.runner.run_checked(
            &self
                .parted(disk)
                .args(["set", &number.to_string(), flag, "on"]),
        )?;
        Ok(())
    }

    /// Subvolume setup failures never undo a created partition.
    pub fn provision_btrfs(&self, device: &str) -> Option<ProvisionReport> {
        let provisioner =
            BtrfsSubvolumeProvisioner::new(self.runner, self.clock, &self.settings.timeouts);
        match provisioner.provision(device) {
            Ok(report) => Some(report),
            Err(err) => {
                emit(
                    Level::Warn,
                    "btrfs.provision.failed",
                    &format!("Btrfs subvolume setup on {device} failed: {err}"),
                    None,
                );
                None
            }
        }
    }

    pub fn remove_partition(&self, device: &str) -> DiskResult<()> {
        let node = naming::parse(device)?;
        let number = node.partition_number.ok_or_else(|| {
            DiskError::parse("device path", format!("{device} is a whole disk"))
        })?;
        self.runner.run_checked(
            &self
                .parted(&node.base_disk)
                .args(["rm".to_string(), number.to_string()]),
        )?;
        self.rescan(&node.base_disk);
        emit(
            Level::Success,
            "disk.partition.removed",
            &format!("Removed {device}"),
            None,
        );
        Ok(())
    }

    /// Format an existing partition; a Btrfs root also gets its subvolumes.
    pub fn format_existing(
        &self,
        device: &str,
        fs: Filesystem,
        is_root: bool,
    ) -> DiskResult<Option<ProvisionReport>> {
        format_partition(self.runner, device, fs, &self.settings.timeouts)?;
        if fs == Filesystem::Btrfs && is_root {
            return Ok(self.provision_btrfs(device));
        }
        Ok(None)
    }
}
