use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "/etc/diskwright/settings.toml";
pub const DRY_RUN_FLAG: &str = "/etc/diskwright/dryrun";

pub const CONFIG_STORE: &str = "/tmp/diskwright/partitions.json";
pub const FSTAB: &str = "/tmp/diskwright/etc/fstab";
pub const TARGET_ROOT: &str = "/tmp/diskwright/root";

pub const EFI_FIRMWARE_DIR: &str = "/sys/firmware/efi";

pub const BY_UUID: &str = "/dev/disk/by-uuid";
pub const BY_LABEL: &str = "/dev/disk/by-label";
pub const BY_PARTUUID: &str = "/dev/disk/by-partuuid";

/// `path` re-rooted under `root`, e.g. `/boot` under `/mnt` is `/mnt/boot`.
pub fn under_root(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_root() {
        assert_eq!(under_root(Path::new("/mnt"), "/boot/efi"), PathBuf::from("/mnt/boot/efi"));
        assert_eq!(under_root(Path::new("/mnt"), "/"), PathBuf::from("/mnt"));
    }
}
