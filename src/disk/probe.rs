//! Live metadata lookups: blkid attributes and the lsblk device tree.

use super::error::DiskResult;
use super::parsing::{BlockDevice, LSBLK_COLUMNS, parse_lsblk};
use crate::execution::{CommandRunner, ToolCommand};
use std::time::Duration;

/// Filesystem attributes of a device as the kernel currently sees them.
pub trait DeviceProbe {
    fn fstype(&self, device: &str) -> Option<String>;

    fn uuid(&self, device: &str) -> Option<String>;
}

pub struct BlkidProbe<'a> {
    runner: &'a dyn CommandRunner,
    timeout: Duration,
}

impl<'a> BlkidProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// `blkid -o value -s <tag>`; a failed lookup or empty value is `None`.
    fn tag(&self, device: &str, tag: &str) -> Option<String> {
        let command = ToolCommand::new("blkid")
            .args(["-o", "value", "-s", tag, device])
            .timeout(self.timeout);
        let output = self.runner.run(&command).ok()?;
        if !output.is_success() {
            return None;
        }
        let value = output.stdout.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    /// `blkid -U <uuid>`: the device holding a filesystem UUID.
    pub fn device_for_uuid(&self, uuid: &str) -> Option<String> {
        let command = ToolCommand::new("blkid")
            .args(["-U", uuid])
            .timeout(self.timeout);
        let output = self.runner.run(&command).ok()?;
        let device = output.stdout.trim();
        (output.is_success() && !device.is_empty()).then(|| device.to_string())
    }
}

impl DeviceProbe for BlkidProbe<'_> {
    fn fstype(&self, device: &str) -> Option<String> {
        self.tag(device, "TYPE")
    }

    fn uuid(&self, device: &str) -> Option<String> {
        self.tag(device, "UUID")
    }
}

pub fn list_block_devices(
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> DiskResult<Vec<BlockDevice>> {
    let command = ToolCommand::new("lsblk")
        .args(["--json", "-b", "-o", LSBLK_COLUMNS])
        .timeout(timeout);
    let output = runner.run_checked(&command)?;
    parse_lsblk(&output.stdout)
}
