use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::sync::Arc;

use super::GlobalArgs;
use crate::disk::session::{DiskOutcome, DiskRequest, DiskSession};
use crate::disk::types::FreeSpaceRegion;
use crate::execution::CommandExecutor;
use crate::execution::host::SystemHost;
use crate::execution::retry::SystemClock;
use crate::execution::worker::{DiskWorker, WorkerEvent};
use crate::settings::EngineSettings;
use crate::ui::prelude::*;

pub fn ensure_root() -> Result<()> {
    if let sudo::RunningAs::User = sudo::check() {
        sudo::with_env(&["RUST_BACKTRACE", "RUST_LOG"])
            .map_err(|e| anyhow::anyhow!("Failed to escalate privileges: {}", e))?;
    }
    Ok(())
}

pub fn load_settings(args: &GlobalArgs) -> Result<EngineSettings> {
    let mut settings = EngineSettings::load(args.settings.as_deref())?;
    if args.dry_run {
        settings.dry_run = true;
    }
    Ok(settings)
}

pub fn build_session(settings: EngineSettings) -> DiskSession {
    let runner = Arc::new(CommandExecutor::new(settings.dry_run));
    DiskSession::new(runner, Arc::new(SystemHost), Arc::new(SystemClock), settings)
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn status_cell(ok: bool, text: &str) -> Cell {
    Cell::new(text).fg(if ok { Color::Green } else { Color::Red })
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `<start>:<end>` in bytes; a trailing `B` is accepted on either side.
pub fn parse_region(spec: &str) -> Result<FreeSpaceRegion> {
    let (start, end) = spec
        .split_once(':')
        .with_context(|| format!("region `{spec}` must look like <start>:<end>"))?;
    let number = |s: &str| -> Result<u64> {
        s.trim()
            .trim_end_matches('B')
            .parse()
            .with_context(|| format!("invalid byte offset `{s}`"))
    };
    FreeSpaceRegion::new(number(start)?, number(end)?)
        .with_context(|| format!("region `{spec}` is empty"))
}

/// Run `request` on the background worker, echoing its events, and report
/// the outcome.
pub async fn run_on_worker(session: DiskSession, request: DiskRequest) -> Result<DiskOutcome> {
    let worker = DiskWorker::new(session);
    let outcome = worker
        .run(request, |event| match event {
            WorkerEvent::Started { description } => emit(
                Level::Info,
                "worker.started",
                &format!("{} {description}", "::".bright_blue()),
                None,
            ),
            WorkerEvent::Progress { message } => {
                emit(Level::Info, "worker.progress", &format!("   {message}"), None)
            }
            WorkerEvent::Finished { .. } => {}
        })
        .await?;

    let data = serde_json::to_value(&outcome).ok();
    emit(Level::Success, "worker.finished", &summarize(&outcome), data);
    Ok(outcome)
}

fn summarize(outcome: &DiskOutcome) -> String {
    match outcome {
        DiskOutcome::TableCreated { disk, table, dropped } => {
            let mut line = format!("Created {table} partition table on {disk}");
            if !dropped.is_empty() {
                line.push_str(&format!(" (forgot {})", dropped.join(", ")));
            }
            line
        }
        DiskOutcome::PartitionCreated(created) => format!("Partition {} is ready", created.device),
        DiskOutcome::Removed { device } => format!("Removed {device}"),
        DiskOutcome::Formatted { device, fstype, .. } => format!("Formatted {device} as {fstype}"),
        DiskOutcome::LayoutApplied { disk, partitions } => {
            let devices: Vec<&str> = partitions.iter().map(|p| p.device.as_str()).collect();
            format!("Partitioned {disk}: {}", devices.join(", "))
        }
        DiskOutcome::ConfigUpdated { device, .. } => format!("Saved configuration for {device}"),
        DiskOutcome::FstabWritten { path } => format!("fstab written to {}", path.display()),
    }
}
