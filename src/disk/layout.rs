//! Automatic partition layouts.

use super::boot_mode::BootMode;
use super::error::{DiskError, DiskResult};
use super::format::Filesystem;
use super::free_space::{self, RegionSelection};
use super::planner::{CreatedPartition, PartitionPlanner, PartitionRequest};
use super::size::SizeSpec;
use super::types::format_size;
use crate::ui::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutPreset {
    /// ESP at `/boot` plus root on UEFI; a single bootable root on BIOS.
    Standard,
    /// ESP at `/boot/efi`, an ext4 `/boot` and root on UEFI; ext4 `/boot`
    /// plus root on BIOS.
    SeparateBoot,
}

impl LayoutPreset {
    pub fn name(&self) -> &'static str {
        match self {
            LayoutPreset::Standard => "standard",
            LayoutPreset::SeparateBoot => "separate-boot",
        }
    }
}

impl FromStr for LayoutPreset {
    type Err = DiskError;

    fn from_str(s: &str) -> DiskResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(LayoutPreset::Standard),
            "separate-boot" | "separate_boot" => Ok(LayoutPreset::SeparateBoot),
            other => Err(DiskError::parse("layout preset", format!("unknown preset `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutStep {
    pub size: SizeSpec,
    pub fstype: Option<Filesystem>,
    pub mountpoint: Option<String>,
    pub bootable: bool,
}

impl LayoutStep {
    fn new(size: SizeSpec, fstype: Filesystem, mountpoint: &str, bootable: bool) -> Self {
        Self {
            size,
            fstype: Some(fstype),
            mountpoint: Some(mountpoint.to_string()),
            bootable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionLayoutPolicy {
    pub name: String,
    pub steps: Vec<LayoutStep>,
}

impl PartitionLayoutPolicy {
    pub fn preset(preset: LayoutPreset, boot_mode: BootMode, root_fs: Filesystem) -> Self {
        use Filesystem::{Ext4, Vfat};

        let steps = match (preset, boot_mode) {
            (LayoutPreset::Standard, BootMode::Uefi) => vec![
                LayoutStep::new(SizeSpec::gib(1), Vfat, "/boot", true),
                LayoutStep::new(SizeSpec::All, root_fs, "/", false),
            ],
            (LayoutPreset::Standard, BootMode::Legacy) => {
                vec![LayoutStep::new(SizeSpec::All, root_fs, "/", true)]
            }
            (LayoutPreset::SeparateBoot, BootMode::Uefi) => vec![
                LayoutStep::new(SizeSpec::mib(512), Vfat, "/boot/efi", true),
                LayoutStep::new(SizeSpec::gib(1), Ext4, "/boot", false),
                LayoutStep::new(SizeSpec::All, root_fs, "/", false),
            ],
            (LayoutPreset::SeparateBoot, BootMode::Legacy) => vec![
                LayoutStep::new(SizeSpec::gib(1), Ext4, "/boot", true),
                LayoutStep::new(SizeSpec::All, root_fs, "/", false),
            ],
        };

        Self {
            name: format!("{}-{}", preset.name(), boot_mode.partition_table().label()),
            steps,
        }
    }

    pub fn fixed_bytes(&self) -> u64 {
        self.steps.iter().filter_map(|s| s.size.bytes()).sum()
    }

    /// Space the policy needs: every fixed step, plus `min_root_bytes` when a
    /// step takes the remainder.
    pub fn required_bytes(&self, min_root_bytes: u64) -> u64 {
        let remainder = self.steps.iter().any(|s| s.size == SizeSpec::All);
        self.fixed_bytes() + if remainder { min_root_bytes } else { 0 }
    }

    pub fn check_fits(&self, available: u64, min_root_bytes: u64) -> DiskResult<()> {
        let requested = self.required_bytes(min_root_bytes);
        if requested > available {
            return Err(DiskError::InsufficientSpace {
                requested,
                available,
            });
        }
        Ok(())
    }
}

/// Create every step of `policy` on `disk`, optionally starting from a fresh
/// table. Nothing is created when the pre-check fails. `on_created` sees each
/// partition as soon as it exists, so callers can record partial progress
/// before a later step fails.
pub fn apply_layout(
    planner: &PartitionPlanner<'_>,
    disk: &str,
    policy: &PartitionLayoutPolicy,
    wipe: bool,
    region: RegionSelection,
    min_root_bytes: u64,
    mut on_created: impl FnMut(&LayoutStep, &CreatedPartition) -> DiskResult<()>,
) -> DiskResult<Vec<CreatedPartition>> {
    // A dry-run wipe writes nothing, so later listings still show the old
    // table; size the fresh table from the whole disk instead.
    let fresh_size = if wipe && planner.dry_run() {
        match planner.scan(disk)? {
            free_space::TableScan::Table(old) => old.disk_size,
            free_space::TableScan::NoPartitionTable => None,
        }
    } else {
        None
    };
    if wipe {
        planner.create_table(disk, planner.boot_mode().partition_table())?;
    }
    let listing = planner.listing_with_table(disk)?;

    let available = match fresh_size {
        Some(size) => size,
        None => free_space::select_region(&listing, disk, region)
            .map(|r| r.size_bytes())
            .unwrap_or(0),
    };
    policy.check_fits(available, min_root_bytes)?;

    emit(
        Level::Info,
        "layout.apply",
        &format!(
            "Applying {} layout to {disk} ({} available)",
            policy.name,
            format_size(available)
        ),
        Some(json!({ "disk": disk, "policy": policy })),
    );

    let mut created = Vec::with_capacity(policy.steps.len());
    for step in &policy.steps {
        let partition = planner.create_partition(&PartitionRequest {
            disk: disk.to_string(),
            size: step.size,
            fstype: step.fstype,
            mountpoint: step.mountpoint.clone(),
            bootable: step.bootable,
            region,
        })?;
        on_created(step, &partition)?;
        created.push(partition);
    }

    emit(
        Level::Success,
        "layout.applied",
        &format!("Applied {} layout to {disk}", policy.name),
        None,
    );
    Ok(created)
}
