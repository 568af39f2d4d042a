use anyhow::{Context, Result};
use comfy_table::Cell;
use std::path::PathBuf;

use super::super::utils::{new_table, print_json};
use crate::disk::mounter::DeviceResolutionMounter;
use crate::disk::session::DiskSession;
use crate::ui::prelude::*;

pub(super) async fn handle_mount_target(
    session: DiskSession,
    fstab: Option<PathBuf>,
    target: Option<PathBuf>,
) -> Result<()> {
    let fstab = fstab.unwrap_or_else(|| session.settings().fstab_path.clone());
    let target = target.unwrap_or_else(|| session.settings().target_root.clone());
    let content = std::fs::read_to_string(&fstab)
        .with_context(|| format!("reading {}", fstab.display()))?;

    emit(
        Level::Info,
        "mount.start",
        &format!("Mounting target root at {}", target.display()),
        None,
    );

    let report = tokio::task::spawn_blocking(move || {
        let mounter = DeviceResolutionMounter::new(
            session.runner(),
            session.host(),
            session.clock(),
            session.settings(),
        );
        mounter.mount_target(&content, &target)
    })
    .await?
    .context("mounting target root")?;

    if get_output_format() == OutputFormat::Json {
        return print_json(&report);
    }
    let mut table = new_table(vec!["Device", "Target", "Type", "Options"]);
    for entry in &report.mounted {
        table.add_row(vec![
            Cell::new(&entry.device),
            Cell::new(entry.target.display()),
            Cell::new(&entry.fstype),
            Cell::new(entry.option.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
    if !report.warnings.is_empty() {
        emit(
            Level::Warn,
            "mount.partial",
            &format!("{} optional mount(s) failed", report.warnings.len()),
            None,
        );
    }
    Ok(())
}
