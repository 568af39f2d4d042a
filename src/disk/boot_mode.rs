use super::types::PartitionTableType;
use crate::execution::host::HostFs;
use crate::paths;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BootMode {
    Uefi,
    Legacy,
}

impl std::fmt::Display for BootMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootMode::Uefi => write!(f, "UEFI"),
            BootMode::Legacy => write!(f, "Legacy BIOS"),
        }
    }
}

impl BootMode {
    /// UEFI firmware exposes its interface under sysfs; anything else boots
    /// through the legacy BIOS path.
    pub fn detect(host: &dyn HostFs) -> Self {
        if host.exists(Path::new(paths::EFI_FIRMWARE_DIR)) {
            BootMode::Uefi
        } else {
            BootMode::Legacy
        }
    }

    pub fn partition_table(&self) -> PartitionTableType {
        match self {
            BootMode::Uefi => PartitionTableType::Gpt,
            BootMode::Legacy => PartitionTableType::Msdos,
        }
    }

    /// Flag set on partitions that hold boot files.
    pub fn boot_flag(&self) -> &'static str {
        match self {
            BootMode::Uefi => "esp",
            BootMode::Legacy => "boot",
        }
    }

    pub fn grub_target(&self) -> &'static str {
        match self {
            BootMode::Uefi => "x86_64-efi",
            BootMode::Legacy => "i386-pc",
        }
    }

    /// Arguments for `grub-install` inside the target system.
    pub fn grub_install_args(&self, disk: &str, efi_dir: &str) -> Vec<String> {
        let target = format!("--target={}", self.grub_target());
        match self {
            BootMode::Uefi => vec![
                target,
                format!("--efi-directory={efi_dir}"),
                "--bootloader-id=GRUB".to_string(),
            ],
            BootMode::Legacy => vec![target, disk.to_string()],
        }
    }
}
