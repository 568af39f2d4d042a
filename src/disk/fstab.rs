//! fstab synthesis from the partition configuration.

use super::btrfs::SUBVOLUME_PLAN;
use super::config::{PartitionConfig, PartitionConfigStore, write_atomic};
use super::error::DiskResult;
use super::probe::DeviceProbe;
use std::path::Path;

pub const HEADER: [&str; 4] = [
    "# /etc/fstab: static file system information.",
    "#",
    "# <file system>             <mount point>  <type>  <options>         <dump>  <pass>",
    "# Generated by diskwright",
];

const BTRFS_OPTIONS: &str = "defaults,compress=zstd,noatime";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabLine {
    pub device_id: String,
    pub mountpoint: String,
    pub fstype: String,
    pub options: String,
    pub dump: u8,
    pub pass: u8,
}

impl FstabLine {
    fn render(&self) -> String {
        // Subvolume option strings are long; give them a wider column.
        let options_width = if self.options.starts_with("subvol=") { 40 } else { 15 };
        format!(
            "{:<25} {:<15} {:<7} {:<options_width$} {:<6} {}",
            self.device_id, self.mountpoint, self.fstype, self.options, self.dump, self.pass
        )
    }
}

/// `(dump, pass)` for an entry; options are always `defaults`.
pub fn dump_pass(fstype: &str, mountpoint: &str, bootable: bool) -> (u8, u8) {
    if fstype == "swap" {
        (0, 0)
    } else if mountpoint == "/" {
        (1, 1)
    } else if bootable && matches!(mountpoint, "/boot" | "/boot/efi") {
        (1, 2)
    } else {
        (0, 2)
    }
}

/// Canonical fstab name for a configured or probed filesystem type.
fn normalize_fstype(fstype: &str) -> String {
    match fstype.to_ascii_lowercase().as_str() {
        "fat32" | "fat16" | "fat" => "vfat".to_string(),
        "linux-swap" => "swap".to_string(),
        other => other.to_string(),
    }
}

/// Build the fstab lines for `store`. The root entry comes first, then the
/// others by mountpoint depth; swap goes last.
pub fn build_lines(store: &PartitionConfigStore, probe: &dyn DeviceProbe) -> Vec<FstabLine> {
    let mut resolved: Vec<(&str, &PartitionConfig, String)> = store
        .entries()
        .iter()
        .map(|(device, config)| {
            let fstype = config
                .fstype
                .clone()
                .or_else(|| probe.fstype(device))
                .map(|fs| normalize_fstype(&fs))
                .unwrap_or_else(|| "auto".to_string());
            (device.as_str(), config, fstype)
        })
        .filter(|(_, config, fstype)| config.mountpoint.is_some() || fstype == "swap")
        .collect();

    resolved.sort_by_key(|(device, config, fstype)| {
        let mountpoint = config.mountpoint.as_deref().unwrap_or("");
        let depth = mountpoint.split('/').filter(|s| !s.is_empty()).count();
        (!config.is_root(), fstype == "swap", depth, mountpoint.to_string(), device.to_string())
    });

    let mut lines = Vec::new();
    for (device, config, fstype) in resolved {
        let device_id = probe
            .uuid(device)
            .map(|uuid| format!("UUID={uuid}"))
            .unwrap_or_else(|| device.to_string());

        if config.is_root() && fstype == "btrfs" {
            for (subvolume, mountpoint) in SUBVOLUME_PLAN {
                let (dump, pass) = dump_pass(&fstype, mountpoint, config.bootable);
                lines.push(FstabLine {
                    device_id: device_id.clone(),
                    mountpoint: mountpoint.to_string(),
                    fstype: fstype.clone(),
                    options: format!("subvol={subvolume},{BTRFS_OPTIONS}"),
                    dump,
                    pass,
                });
            }
            continue;
        }

        let mountpoint = match config.mountpoint.as_deref() {
            Some(mp) => mp.to_string(),
            None => "none".to_string(),
        };
        let (dump, pass) = dump_pass(&fstype, &mountpoint, config.bootable);
        lines.push(FstabLine {
            device_id,
            mountpoint,
            fstype,
            options: "defaults".to_string(),
            dump,
            pass,
        });
    }
    lines
}

pub fn generate(store: &PartitionConfigStore, probe: &dyn DeviceProbe) -> String {
    let mut out: Vec<String> = HEADER.iter().map(|s| s.to_string()).collect();
    out.push(String::new());

    let lines = build_lines(store, probe);
    if lines.is_empty() {
        out.push("# No partition configuration found".to_string());
    }
    out.extend(lines.iter().map(FstabLine::render));

    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// Replace the fstab at `path` atomically.
pub fn write(path: &Path, content: &str) -> DiskResult<()> {
    write_atomic(path, content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StaticProbe {
        uuids: HashMap<String, String>,
        types: HashMap<String, String>,
    }

    impl StaticProbe {
        fn with_uuid(mut self, device: &str, uuid: &str) -> Self {
            self.uuids.insert(device.into(), uuid.into());
            self
        }

        fn with_type(mut self, device: &str, fstype: &str) -> Self {
            self.types.insert(device.into(), fstype.into());
            self
        }
    }

    impl DeviceProbe for StaticProbe {
        fn fstype(&self, device: &str) -> Option<String> {
            self.types.get(device).cloned()
        }

        fn uuid(&self, device: &str) -> Option<String> {
            self.uuids.get(device).cloned()
        }
    }

    fn config(mountpoint: Option<&str>, bootable: bool, fstype: Option<&str>) -> PartitionConfig {
        PartitionConfig {
            mountpoint: mountpoint.map(str::to_string),
            bootable,
            fstype: fstype.map(str::to_string),
        }
    }

    fn entry_lines(text: &str) -> Vec<Vec<String>> {
        text.lines()
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_btrfs_root_expands_to_subvolumes() {
        let mut store = PartitionConfigStore::new("/unused");
        store
            .upsert("/dev/sda2", config(Some("/"), false, Some("btrfs")))
            .unwrap();
        let probe = StaticProbe::default().with_uuid("/dev/sda2", "1111-2222");

        let lines = entry_lines(&generate(&store, &probe));
        assert_eq!(lines.len(), 5);
        for line in &lines {
            assert_eq!(line[0], "UUID=1111-2222");
            assert_eq!(line[2], "btrfs");
        }
        let subvolumes: Vec<&str> = lines
            .iter()
            .map(|l| l[3].split(',').next().unwrap())
            .collect();
        assert_eq!(
            subvolumes,
            vec!["subvol=@", "subvol=@home", "subvol=@var", "subvol=@tmp", "subvol=@snapshots"]
        );
        assert_eq!(lines[0][1], "/");
        assert_eq!(lines[0][5], "1");
        for line in &lines[1..] {
            assert_eq!(line[5], "2");
        }
        assert_eq!(lines[4][3], "subvol=@snapshots,defaults,compress=zstd,noatime");
    }

    #[test]
    fn test_swap_without_mountpoint() {
        let mut store = PartitionConfigStore::new("/unused");
        store.upsert("/dev/sda3", config(None, false, Some("swap"))).unwrap();
        let lines = entry_lines(&generate(&store, &StaticProbe::default()));
        assert_eq!(
            lines,
            vec![vec!["/dev/sda3", "none", "swap", "defaults", "0", "0"]]
        );
    }

    #[test]
    fn test_rules_and_ordering() {
        let mut store = PartitionConfigStore::new("/unused");
        store
            .upsert("/dev/nvme0n1p1", config(Some("/boot/efi"), true, Some("fat32")))
            .unwrap();
        store
            .upsert("/dev/nvme0n1p2", config(Some("/boot"), true, Some("ext4")))
            .unwrap();
        store.upsert("/dev/nvme0n1p3", config(None, false, Some("swap"))).unwrap();
        store.upsert("/dev/nvme0n1p4", config(Some("/"), false, None)).unwrap();
        store.upsert("/dev/nvme0n1p5", config(Some("/data"), false, None)).unwrap();
        store.upsert("/dev/sdb1", config(None, false, Some("ext4"))).unwrap();
        let probe = StaticProbe::default()
            .with_type("/dev/nvme0n1p4", "xfs")
            .with_uuid("/dev/nvme0n1p4", "root-uuid");

        let lines = entry_lines(&generate(&store, &probe));
        let summary: Vec<(String, String, String, String)> = lines
            .iter()
            .map(|l| (l[1].clone(), l[2].clone(), l[4].clone(), l[5].clone()))
            .collect();
        let expect = [
            ("/", "xfs", "1", "1"),
            ("/boot", "ext4", "1", "2"),
            ("/data", "auto", "0", "2"),
            ("/boot/efi", "vfat", "1", "2"),
            ("none", "swap", "0", "0"),
        ];
        assert_eq!(summary.len(), expect.len());
        for (got, want) in summary.iter().zip(expect) {
            assert_eq!((got.0.as_str(), got.1.as_str(), got.2.as_str(), got.3.as_str()), want);
        }
        assert_eq!(lines[0][0], "UUID=root-uuid");
    }

    #[test]
    fn test_non_bootable_boot_gets_default_rule() {
        assert_eq!(dump_pass("ext4", "/boot", false), (0, 2));
        assert_eq!(dump_pass("vfat", "/boot/efi", true), (1, 2));
        assert_eq!(dump_pass("swap", "/", true), (0, 0));
    }

    #[test]
    fn test_generation_is_idempotent_and_padded() {
        let mut store = PartitionConfigStore::new("/unused");
        store.upsert("/dev/sda1", config(Some("/"), true, Some("ext4"))).unwrap();
        let probe = StaticProbe::default().with_uuid("/dev/sda1", "abcd");

        let first = generate(&store, &probe);
        assert_eq!(first, generate(&store, &probe));
        assert!(first.ends_with('\n'));
        let line = first.lines().last().unwrap();
        assert_eq!(
            line,
            format!("{:<25} {:<15} {:<7} {:<15} {:<6} {}", "UUID=abcd", "/", "ext4", "defaults", 1, 1)
        );
    }

    #[test]
    fn test_empty_store() {
        let store = PartitionConfigStore::new("/unused");
        let text = generate(&store, &StaticProbe::default());
        assert!(text.contains("# No partition configuration found"));
        assert!(entry_lines(&text).is_empty());
    }

    #[test]
    fn test_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/fstab");
        write(&path, "old\n").unwrap();
        write(&path, "new\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }
}
