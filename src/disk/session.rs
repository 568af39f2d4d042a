//! One place where disk operations meet the persisted configuration.
//!
//! Every request touches the disk (if it needs to) before the store, so a
//! failed tool invocation never leaves a configuration describing something
//! that was not applied. Successful mutations regenerate the fstab.

use super::boot_mode::BootMode;
use super::config::{PartitionConfig, PartitionConfigStore};
use super::error::{DiskError, DiskResult};
use super::format::Filesystem;
use super::free_space::RegionSelection;
use super::fstab;
use super::layout::{PartitionLayoutPolicy, apply_layout};
use super::planner::{CreatedPartition, PartitionPlanner, PartitionRequest};
use super::probe::BlkidProbe;
use super::types::PartitionTableType;
use crate::execution::CommandRunner;
use crate::execution::host::HostFs;
use crate::execution::retry::Clock;
use crate::settings::EngineSettings;
use crate::ui::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskRequest {
    CreateTable {
        disk: String,
        /// Defaults to the boot mode's table type.
        table: Option<PartitionTableType>,
    },
    CreatePartition(PartitionRequest),
    Remove {
        device: String,
    },
    Format {
        device: String,
        fstype: Filesystem,
    },
    ApplyLayout {
        disk: String,
        policy: PartitionLayoutPolicy,
        wipe: bool,
        region: RegionSelection,
    },
    SetMountpoint {
        device: String,
        mountpoint: Option<String>,
    },
    SetBootable {
        device: String,
        bootable: bool,
    },
    SetFstype {
        device: String,
        fstype: Option<Filesystem>,
    },
    RegenerateFstab,
}

impl DiskRequest {
    /// Short label used in progress events.
    pub fn describe(&self) -> String {
        match self {
            DiskRequest::CreateTable { disk, .. } => format!("create partition table on {disk}"),
            DiskRequest::CreatePartition(req) => format!("create partition on {}", req.disk),
            DiskRequest::Remove { device } => format!("remove {device}"),
            DiskRequest::Format { device, fstype } => format!("format {device} as {fstype}"),
            DiskRequest::ApplyLayout { disk, policy, .. } => {
                format!("apply {} layout to {disk}", policy.name)
            }
            DiskRequest::SetMountpoint { device, .. }
            | DiskRequest::SetBootable { device, .. }
            | DiskRequest::SetFstype { device, .. } => format!("configure {device}"),
            DiskRequest::RegenerateFstab => "regenerate fstab".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DiskOutcome {
    TableCreated {
        disk: String,
        table: PartitionTableType,
        dropped: Vec<String>,
    },
    PartitionCreated(CreatedPartition),
    Removed {
        device: String,
    },
    Formatted {
        device: String,
        fstype: Filesystem,
        provision: Option<super::btrfs::ProvisionReport>,
    },
    LayoutApplied {
        disk: String,
        partitions: Vec<CreatedPartition>,
    },
    ConfigUpdated {
        device: String,
        config: PartitionConfig,
    },
    FstabWritten {
        path: PathBuf,
    },
}

/// Shared capabilities plus settings; cheap to clone into a worker task.
#[derive(Clone)]
pub struct DiskSession {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostFs>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    boot_mode: BootMode,
}

impl DiskSession {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        host: Arc<dyn HostFs>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let boot_mode = BootMode::detect(host.as_ref());
        Self {
            runner,
            host,
            clock,
            settings,
            boot_mode,
        }
    }

    pub fn with_boot_mode(mut self, boot_mode: BootMode) -> Self {
        self.boot_mode = boot_mode;
        self
    }

    pub fn boot_mode(&self) -> BootMode {
        self.boot_mode
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn host(&self) -> &dyn HostFs {
        self.host.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn planner(&self) -> PartitionPlanner<'_> {
        PartitionPlanner::new(
            self.runner.as_ref(),
            self.host.as_ref(),
            self.clock.as_ref(),
            &self.settings,
            self.boot_mode,
        )
    }

    pub fn load_store(&self) -> DiskResult<PartitionConfigStore> {
        PartitionConfigStore::load(&self.settings.config_store_path)
    }

    pub fn render_fstab(&self, store: &PartitionConfigStore) -> String {
        let probe = BlkidProbe::new(self.runner.as_ref(), self.settings.timeouts.probe());
        fstab::generate(store, &probe)
    }

    pub fn write_fstab(&self, store: &PartitionConfigStore) -> DiskResult<PathBuf> {
        let content = self.render_fstab(store);
        fstab::write(&self.settings.fstab_path, &content)?;
        emit(
            Level::Success,
            "fstab.written",
            &format!("Wrote {}", self.settings.fstab_path.display()),
            None,
        );
        Ok(self.settings.fstab_path.clone())
    }

    /// Persist the store and refresh the fstab. The store write is the commit
    /// point; a failed fstab refresh after it is only reported.
    fn commit(&self, store: &PartitionConfigStore) -> DiskResult<()> {
        store.save()?;
        if let Err(err) = self.write_fstab(store) {
            emit(
                Level::Warn,
                "fstab.regenerate.failed",
                &format!("Could not regenerate fstab: {err}"),
                Some(json!({ "error": err.code() })),
            );
        }
        Ok(())
    }

    pub fn execute(&self, request: &DiskRequest) -> DiskResult<DiskOutcome> {
        self.execute_with_progress(request, &mut |_| {})
    }

    pub fn execute_with_progress(
        &self,
        request: &DiskRequest,
        progress: &mut dyn FnMut(String),
    ) -> DiskResult<DiskOutcome> {
        match request {
            DiskRequest::CreateTable { disk, table } => self.create_table(disk, *table),
            DiskRequest::CreatePartition(req) => self.create_partition(req),
            DiskRequest::Remove { device } => self.remove(device),
            DiskRequest::Format { device, fstype } => self.format(device, *fstype),
            DiskRequest::ApplyLayout {
                disk,
                policy,
                wipe,
                region,
            } => self.apply_layout(disk, policy, *wipe, *region, progress),
            DiskRequest::SetMountpoint { device, mountpoint } => {
                let mountpoint = mountpoint.clone();
                self.edit(device, |c| c.mountpoint = mountpoint)
            }
            DiskRequest::SetBootable { device, bootable } => {
                let bootable = *bootable;
                self.edit(device, |c| c.bootable = bootable)
            }
            DiskRequest::SetFstype { device, fstype } => {
                let fstype = fstype.map(|fs| fs.name().to_string());
                self.edit(device, |c| c.fstype = fstype)
            }
            DiskRequest::RegenerateFstab => {
                let store = self.load_store()?;
                let path = self.write_fstab(&store)?;
                Ok(DiskOutcome::FstabWritten { path })
            }
        }
    }

    fn create_table(
        &self,
        disk: &str,
        table: Option<PartitionTableType>,
    ) -> DiskResult<DiskOutcome> {
        let table = table.unwrap_or_else(|| self.boot_mode.partition_table());
        let mut store = self.load_store()?;
        self.planner().create_table(disk, table)?;

        let dropped = store.remove_disk(disk);
        self.commit(&store)?;
        Ok(DiskOutcome::TableCreated {
            disk: disk.to_string(),
            table,
            dropped,
        })
    }

    fn create_partition(&self, request: &PartitionRequest) -> DiskResult<DiskOutcome> {
        let mut store = self.load_store()?;
        let config = PartitionConfig {
            mountpoint: request.mountpoint.clone(),
            bootable: request.bootable,
            fstype: request.fstype.map(|fs| fs.name().to_string()),
        };
        store.check_available(None, &config)?;

        let created = self.planner().create_partition(request)?;
        store.upsert(&created.device, config)?;
        self.commit(&store)?;
        Ok(DiskOutcome::PartitionCreated(created))
    }

    fn remove(&self, device: &str) -> DiskResult<DiskOutcome> {
        let mut store = self.load_store()?;
        self.planner().remove_partition(device)?;
        store.remove(device);
        self.commit(&store)?;
        Ok(DiskOutcome::Removed {
            device: device.to_string(),
        })
    }

    fn format(&self, device: &str, fstype: Filesystem) -> DiskResult<DiskOutcome> {
        let mut store = self.load_store()?;
        let mut config = store.get(device).cloned().unwrap_or_default();
        config.fstype = Some(fstype.name().to_string());
        store.check_available(Some(device), &config)?;

        let provision = self
            .planner()
            .format_existing(device, fstype, config.is_root())?;
        store.upsert(device, config)?;
        self.commit(&store)?;
        Ok(DiskOutcome::Formatted {
            device: device.to_string(),
            fstype,
            provision,
        })
    }

    fn apply_layout(
        &self,
        disk: &str,
        policy: &PartitionLayoutPolicy,
        wipe: bool,
        region: RegionSelection,
        progress: &mut dyn FnMut(String),
    ) -> DiskResult<DiskOutcome> {
        let mut store = self.load_store()?;

        // Check the whole policy against the store before anything is written.
        let mut preview = store.clone();
        if wipe {
            preview.remove_disk(disk);
        }
        for (index, step) in policy.steps.iter().enumerate() {
            let config = step_config(step);
            preview.upsert(&format!("{disk}#{index}"), config)?;
        }

        if wipe {
            store.remove_disk(disk);
        }
        let total = policy.steps.len();
        let mut done = 0;
        let result = apply_layout(
            &self.planner(),
            disk,
            policy,
            wipe,
            region,
            self.settings.min_root_bytes,
            |step, created| {
                done += 1;
                progress(format!("{done}/{total}: created {}", created.device));
                store.upsert(&created.device, step_config(step))
            },
        );

        // Partitions that exist are recorded even if a later step failed.
        if wipe || done > 0 {
            self.commit(&store)?;
        }
        let partitions = result?;
        Ok(DiskOutcome::LayoutApplied {
            disk: disk.to_string(),
            partitions,
        })
    }

    fn edit(
        &self,
        device: &str,
        edit: impl FnOnce(&mut PartitionConfig),
    ) -> DiskResult<DiskOutcome> {
        let mut store = self.load_store()?;
        store.update(device, edit)?;
        self.commit(&store)?;

        let config = store.get(device).cloned().unwrap_or_default();
        emit(
            Level::Success,
            "config.updated",
            &format!("Updated configuration for {device}"),
            Some(json!({ "device": device, "config": config })),
        );
        Ok(DiskOutcome::ConfigUpdated {
            device: device.to_string(),
            config,
        })
    }
}

fn step_config(step: &super::layout::LayoutStep) -> PartitionConfig {
    PartitionConfig {
        mountpoint: step.mountpoint.clone(),
        bootable: step.bootable,
        fstype: step.fstype.map(|fs| fs.name().to_string()),
    }
}

impl std::fmt::Debug for DiskSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskSession")
            .field("boot_mode", &self.boot_mode)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Surface a missing-configuration error as one line per requirement.
pub fn describe_missing(err: &DiskError) -> Vec<String> {
    match err {
        DiskError::MissingConfiguration(missing) => {
            missing.iter().map(ToString::to_string).collect()
        }
        other => vec![other.to_string()],
    }
}
