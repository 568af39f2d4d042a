//! Read-only commands: device listings, free space, naming and preflight checks.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use comfy_table::Cell;
use serde_json::json;

use super::super::utils::{new_table, print_json, status_cell};
use crate::disk::config::PartitionConfig;
use crate::disk::free_space::{self, TableScan};
use crate::disk::naming;
use crate::disk::probe::list_block_devices;
use crate::disk::parsing::installable_disks;
use crate::disk::session::{DiskSession, describe_missing};
use crate::disk::types::format_size;
use crate::ui::prelude::*;

/// External programs the engine shells out to.
const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("parted", "partition tables"),
    ("partprobe", "kernel table re-read"),
    ("lsblk", "device listing"),
    ("blkid", "UUID and type lookup"),
    ("mount", "mounting"),
    ("umount", "unmounting"),
    ("mkfs.ext4", "ext4"),
    ("mkfs.btrfs", "btrfs"),
    ("btrfs", "btrfs subvolumes"),
    ("mkfs.xfs", "xfs"),
    ("mkfs.f2fs", "f2fs"),
    ("mkfs.fat", "vfat / ESP"),
    ("mkfs.ntfs", "ntfs"),
    ("mkfs.exfat", "exfat"),
    ("mkswap", "swap"),
];

fn describe_config(config: &PartitionConfig) -> String {
    let mut parts = Vec::new();
    if let Some(mp) = &config.mountpoint {
        parts.push(mp.clone());
    }
    if let Some(fs) = &config.fstype {
        parts.push(fs.clone());
    }
    if config.bootable {
        parts.push("bootable".to_string());
    }
    parts.join(", ")
}

pub(super) fn handle_disks(session: &DiskSession) -> Result<()> {
    let devices = list_block_devices(session.runner(), session.settings().timeouts.probe())
        .context("listing block devices")?;
    let disks = installable_disks(devices);
    if get_output_format() == OutputFormat::Json {
        return print_json(&disks);
    }
    if disks.is_empty() {
        emit(
            Level::Warn,
            "disk.none",
            "No installable disks found. Are you running as root?",
            None,
        );
        return Ok(());
    }

    let store = session.load_store()?;
    let mut table = new_table(vec!["Device", "Size", "Filesystem", "Label", "Mounted", "Configured"]);
    for disk in &disks {
        table.add_row(vec![
            Cell::new(disk.path()),
            Cell::new(format_size(disk.size)),
            Cell::new(""),
            Cell::new(disk.label.as_deref().unwrap_or("")),
            Cell::new(disk.mountpoint.as_deref().unwrap_or("")),
            Cell::new(""),
        ]);
        for part in &disk.children {
            let path = part.path();
            let configured = store.get(&path).map(describe_config).unwrap_or_default();
            table.add_row(vec![
                Cell::new(format!("  └ {path}")),
                Cell::new(format_size(part.size)),
                Cell::new(part.fstype.as_deref().unwrap_or("")),
                Cell::new(part.label.as_deref().unwrap_or("")),
                Cell::new(part.mountpoint.as_deref().unwrap_or("")),
                Cell::new(configured),
            ]);
        }
    }
    println!("{table}");
    Ok(())
}

pub(super) fn handle_free(session: &DiskSession, disk: &str) -> Result<()> {
    let scan = free_space::scan(session.runner(), disk, session.settings().timeouts.probe())
        .with_context(|| format!("scanning {disk}"))?;
    let listing = match scan {
        TableScan::NoPartitionTable => {
            emit(
                Level::Warn,
                "disk.table.missing",
                &format!(
                    "{disk} has no partition table; `create` will write a {} table first",
                    session.boot_mode().partition_table()
                ),
                Some(json!({ "disk": disk, "table": null })),
            );
            return Ok(());
        }
        TableScan::Table(listing) => listing,
    };

    if get_output_format() == OutputFormat::Json {
        return print_json(&json!({
            "disk": disk,
            "table": listing.table,
            "disk_size": listing.disk_size,
            "sector_size": listing.sector_size,
            "partitions": listing.partitions,
            "free": listing.free,
        }));
    }

    println!(
        "{} {} ({}, {})",
        "Disk".bold(),
        disk.bright_white(),
        listing.table,
        listing.disk_size.map(format_size).unwrap_or_else(|| "unknown size".into())
    );
    let mut table = new_table(vec!["#", "Start", "End", "Size", "Contents"]);
    let mut rows: Vec<(u64, Vec<Cell>)> = listing
        .partitions
        .iter()
        .map(|p| {
            let contents = match (&p.filesystem, p.flags.is_empty()) {
                (Some(fs), false) => format!("{fs} [{}]", p.flags.join(", ")),
                (Some(fs), true) => fs.clone(),
                (None, false) => format!("[{}]", p.flags.join(", ")),
                (None, true) => String::new(),
            };
            (
                p.region.start_byte,
                vec![
                    Cell::new(p.number),
                    Cell::new(p.region.start_byte),
                    Cell::new(p.region.end_byte),
                    Cell::new(format_size(p.region.size_bytes())),
                    Cell::new(contents),
                ],
            )
        })
        .collect();
    rows.extend(listing.free.iter().map(|r| {
        (
            r.start_byte,
            vec![
                Cell::new(""),
                Cell::new(r.start_byte),
                Cell::new(r.end_byte),
                Cell::new(format_size(r.size_bytes())),
                status_cell(true, "free"),
            ],
        )
    }));
    rows.sort_by_key(|(start, _)| *start);
    for (_, row) in rows {
        table.add_row(row);
    }
    println!("{table}");
    Ok(())
}

pub(super) fn handle_parse(device: &str) -> Result<()> {
    let node = naming::parse(device)?;
    if get_output_format() == OutputFormat::Json {
        return print_json(&node);
    }
    println!("  {:<18} {}", "Device:", node.path);
    println!("  {:<18} {}", "Base disk:", node.base_disk);
    println!(
        "  {:<18} {}",
        "Partition:",
        node.partition_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "whole disk".into())
    );
    println!("  {:<18} {}", "Naming scheme:", node.disk_type);
    Ok(())
}

pub(super) fn handle_boot_mode(session: &DiskSession) -> Result<()> {
    let mode = session.boot_mode();
    let table = mode.partition_table();

    // grub-install arguments follow the configured root disk and ESP mount.
    let store = session.load_store()?;
    let disk = store
        .root()
        .and_then(|(device, _)| naming::parse(device).ok())
        .map(|node| node.base_disk)
        .unwrap_or_else(|| "<disk>".to_string());
    let efi_dir = if store
        .entries()
        .values()
        .any(|c| c.mountpoint.as_deref() == Some("/boot/efi"))
    {
        "/boot/efi"
    } else {
        "/boot"
    };
    let grub_args = mode.grub_install_args(&disk, efi_dir);

    if get_output_format() == OutputFormat::Json {
        return print_json(&json!({
            "boot_mode": mode,
            "partition_table": table,
            "boot_flag": mode.boot_flag(),
            "grub_target": mode.grub_target(),
            "grub_install_args": grub_args,
        }));
    }
    println!("  {:<18} {}", "Boot mode:", mode.to_string().bright_cyan());
    println!("  {:<18} {}", "Partition table:", table);
    println!("  {:<18} {}", "Boot flag:", mode.boot_flag());
    println!("  {:<18} {}", "GRUB target:", mode.grub_target());
    println!("  {:<18} grub-install {}", "Bootloader:", grub_args.join(" "));
    Ok(())
}

pub(super) fn handle_tools() -> Result<()> {
    let found: Vec<(&str, &str, Option<String>)> = REQUIRED_TOOLS
        .iter()
        .map(|(tool, purpose)| {
            let path = which::which(tool)
                .ok()
                .map(|p| p.to_string_lossy().into_owned());
            (*tool, *purpose, path)
        })
        .collect();

    if get_output_format() == OutputFormat::Json {
        let report: Vec<_> = found
            .iter()
            .map(|(tool, purpose, path)| json!({ "tool": tool, "purpose": purpose, "path": path }))
            .collect();
        return print_json(&report);
    }

    let mut table = new_table(vec!["Tool", "Used for", "Status"]);
    for (tool, purpose, path) in &found {
        let status = match path {
            Some(path) => status_cell(true, path),
            None => status_cell(false, "missing"),
        };
        table.add_row(vec![Cell::new(tool), Cell::new(purpose), status]);
    }
    println!("{table}");

    let missing = found.iter().filter(|(_, _, p)| p.is_none()).count();
    if missing > 0 {
        emit(
            Level::Warn,
            "tools.missing",
            &format!("{missing} tool(s) missing; the matching operations will fail"),
            None,
        );
    }
    Ok(())
}

pub(super) fn handle_validate(session: &DiskSession) -> Result<()> {
    let store = session.load_store()?;
    match store.validate() {
        Ok(()) => {
            let root = store.root().map(|(device, _)| device).unwrap_or_default();
            emit(
                Level::Success,
                "config.valid",
                &format!("Configuration is complete (root on {root})"),
                Some(json!({ "root": root })),
            );
            Ok(())
        }
        Err(err) => {
            for line in describe_missing(&err) {
                emit(Level::Error, err.code(), &format!("Missing: {line}"), None);
            }
            bail!("partition configuration is incomplete")
        }
    }
}
