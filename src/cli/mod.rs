mod commands;
mod utils;

use clap::Subcommand;
use std::path::PathBuf;

pub use commands::handle_command;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub settings: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List installable disks with their partitions and configured mountpoints
    Disks,
    /// Show partitions and free regions of a disk
    Free {
        /// Whole-disk device path, e.g. /dev/sda
        disk: String,
    },
    /// Split a device path into base disk and partition number
    Parse {
        device: String,
    },
    /// Report the firmware boot mode and what it implies
    BootMode,
    /// Check which external tools are installed
    Tools,
    /// Write a new, empty partition table (destroys every partition)
    Mklabel {
        disk: String,
        /// Table type; defaults to gpt on UEFI and msdos on BIOS
        #[arg(long, value_parser = ["gpt", "msdos"])]
        table: Option<String>,
    },
    /// Create a partition in a free region and format it
    Create {
        disk: String,
        /// Size such as 512MiB, 20GB or 100%
        #[arg(long)]
        size: String,
        /// Filesystem to create (ext4, btrfs, xfs, f2fs, vfat, ntfs, exfat, swap, unformatted)
        #[arg(long = "fs")]
        fstype: Option<String>,
        /// Mountpoint to record for the new partition
        #[arg(long = "mount")]
        mountpoint: Option<String>,
        /// Flag the partition as bootable (ESP on UEFI)
        #[arg(long)]
        bootable: bool,
        /// Restrict placement to a byte range, `<start>:<end>`
        #[arg(long)]
        region: Option<String>,
    },
    /// Delete a partition and forget its configuration
    Remove {
        device: String,
    },
    /// Format an existing partition
    Format {
        device: String,
        fstype: String,
    },
    /// Partition a disk automatically with a layout preset
    Auto {
        disk: String,
        #[arg(long, default_value = "standard", value_parser = ["standard", "separate-boot"])]
        preset: String,
        /// Filesystem for the root partition
        #[arg(long, default_value = "ext4")]
        root_fs: String,
        /// Keep the existing partition table and use its largest free region
        #[arg(long)]
        keep_table: bool,
    },
    /// Change the recorded configuration of a device
    Set {
        device: String,
        #[arg(long = "mount", conflicts_with = "no_mount")]
        mountpoint: Option<String>,
        /// Clear the recorded mountpoint
        #[arg(long)]
        no_mount: bool,
        #[arg(long)]
        bootable: Option<bool>,
        /// Filesystem to record (`unformatted` clears it)
        #[arg(long = "fs")]
        fstype: Option<String>,
    },
    /// Regenerate the fstab from the stored configuration
    Fstab {
        /// Print to stdout instead of writing the file
        #[arg(long)]
        print: bool,
    },
    /// Check the configuration has a root and a bootable partition
    Validate,
    /// Mount the target root (and /boot, /boot/efi) as described by an fstab
    MountTarget {
        #[arg(long)]
        fstab: Option<PathBuf>,
        #[arg(long)]
        target: Option<PathBuf>,
    },
    /// Print the effective settings as TOML
    Settings,
}

impl Commands {
    /// Commands that change disks or mounts need root, unless dry-running.
    pub fn needs_root(&self) -> bool {
        matches!(
            self,
            Commands::Mklabel { .. }
                | Commands::Create { .. }
                | Commands::Remove { .. }
                | Commands::Format { .. }
                | Commands::Auto { .. }
                | Commands::MountTarget { .. }
        )
    }
}
