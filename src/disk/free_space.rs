//! Free-space analysis on top of the parted listing.

use super::error::{DiskError, DiskResult};
use super::parsing::{PartedListing, is_missing_label, parse_print_free};
use super::types::{FreeSpaceRegion, PartitionTableType, SECTOR_SIZE};
use crate::execution::{CommandRunner, ToolCommand};
use crate::ui::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableScan {
    /// The disk carries no recognisable label; a table must be created first.
    NoPartitionTable,
    Table(PartedListing),
}

/// Which free region a new partition goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSelection {
    /// Automatic flows take the biggest gap.
    Largest,
    /// Manual flows pass the region the user picked.
    Explicit(FreeSpaceRegion),
}

pub fn print_free_command(disk: &str, timeout: Duration) -> ToolCommand {
    ToolCommand::new("parted")
        .args(["-s", disk, "unit", "B", "print", "free"])
        .timeout(timeout)
}

pub fn scan(runner: &dyn CommandRunner, disk: &str, timeout: Duration) -> DiskResult<TableScan> {
    let command = print_free_command(disk, timeout);
    let output = runner.run(&command)?;

    if is_missing_label(&output.stderr) {
        emit(
            Level::Debug,
            "disk.scan.no_table",
            &format!("{disk} has no partition table"),
            None,
        );
        return Ok(TableScan::NoPartitionTable);
    }

    let output = output.into_checked(&command)?;
    let listing = parse_print_free(&output.stdout)?;
    // "loop" label: a filesystem written straight onto the disk.
    if listing.table == PartitionTableType::Unknown {
        return Ok(TableScan::NoPartitionTable);
    }
    Ok(TableScan::Table(listing))
}

/// Scan and fail with `NoPartitionTable` instead of returning it.
pub fn require_table(
    runner: &dyn CommandRunner,
    disk: &str,
    timeout: Duration,
) -> DiskResult<PartedListing> {
    match scan(runner, disk, timeout)? {
        TableScan::Table(listing) => Ok(listing),
        TableScan::NoPartitionTable => Err(DiskError::NoPartitionTable(disk.to_string())),
    }
}

/// Resolve a selection against the current listing. An explicit region is
/// matched to the listed gap it overlaps most and clipped to it, so a stale
/// or slightly-off region from the UI never reaches into a partition.
pub fn select_region(
    listing: &PartedListing,
    disk: &str,
    selection: RegionSelection,
) -> DiskResult<FreeSpaceRegion> {
    match selection {
        RegionSelection::Largest => {
            listing
                .largest_free()
                .ok_or(DiskError::InsufficientSpace {
                    requested: SECTOR_SIZE,
                    available: 0,
                })
        }
        RegionSelection::Explicit(wanted) => listing
            .free
            .iter()
            .filter_map(|free| free.intersection(&wanted))
            .max_by_key(FreeSpaceRegion::size_bytes)
            .ok_or_else(|| DiskError::RegionUnavailable {
                disk: disk.to_string(),
                start: wanted.start_byte,
                end: wanted.end_byte,
            }),
    }
}
