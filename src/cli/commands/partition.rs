use anyhow::{Context, Result};
use serde_json::json;

use super::super::utils::{parse_region, run_on_worker};
use crate::disk::format::{Filesystem, parse_requested};
use crate::disk::free_space::RegionSelection;
use crate::disk::layout::{LayoutPreset, PartitionLayoutPolicy};
use crate::disk::planner::PartitionRequest;
use crate::disk::session::{DiskRequest, DiskSession};
use crate::disk::size::SizeSpec;
use crate::disk::types::PartitionTableType;
use crate::ui::prelude::*;

pub(super) struct CreateArgs {
    pub disk: String,
    pub size: String,
    pub fstype: Option<String>,
    pub mountpoint: Option<String>,
    pub bootable: bool,
    pub region: Option<String>,
}

pub(super) async fn handle_mklabel(
    session: DiskSession,
    disk: String,
    table: Option<String>,
) -> Result<()> {
    let table = table.as_deref().map(PartitionTableType::from_label);
    run_on_worker(session, DiskRequest::CreateTable { disk, table }).await?;
    Ok(())
}

pub(super) async fn handle_create(session: DiskSession, args: CreateArgs) -> Result<()> {
    let size: SizeSpec = args
        .size
        .parse()
        .with_context(|| format!("invalid --size `{}`", args.size))?;
    let fstype = match args.fstype.as_deref() {
        Some(name) => parse_requested(name)?,
        None => None,
    };
    let region = match args.region.as_deref() {
        Some(spec) => RegionSelection::Explicit(parse_region(spec)?),
        None => RegionSelection::Largest,
    };

    let request = PartitionRequest {
        disk: args.disk,
        size,
        fstype,
        mountpoint: args.mountpoint,
        bootable: args.bootable,
        region,
    };
    run_on_worker(session, DiskRequest::CreatePartition(request)).await?;
    Ok(())
}

pub(super) async fn handle_remove(session: DiskSession, device: String) -> Result<()> {
    run_on_worker(session, DiskRequest::Remove { device }).await?;
    Ok(())
}

pub(super) async fn handle_format(session: DiskSession, device: String, fstype: String) -> Result<()> {
    let fstype: Filesystem = fstype.parse()?;
    run_on_worker(session, DiskRequest::Format { device, fstype }).await?;
    Ok(())
}

pub(super) async fn handle_auto(
    session: DiskSession,
    disk: String,
    preset: &str,
    root_fs: &str,
    keep_table: bool,
) -> Result<()> {
    let preset: LayoutPreset = preset.parse()?;
    let root_fs: Filesystem = root_fs.parse()?;
    let policy = PartitionLayoutPolicy::preset(preset, session.boot_mode(), root_fs);

    emit(
        Level::Info,
        "layout.plan",
        &format!(
            "{} boot, {} layout: {}",
            session.boot_mode(),
            policy.name,
            policy
                .steps
                .iter()
                .map(|s| format!(
                    "{} {} {}",
                    s.size,
                    s.fstype.map(|f| f.name()).unwrap_or("raw"),
                    s.mountpoint.as_deref().unwrap_or("-")
                ))
                .collect::<Vec<_>>()
                .join(" + ")
        ),
        Some(json!({ "policy": policy, "wipe": !keep_table })),
    );

    run_on_worker(
        session,
        DiskRequest::ApplyLayout {
            disk,
            policy,
            wipe: !keep_table,
            region: RegionSelection::Largest,
        },
    )
    .await?;
    Ok(())
}
