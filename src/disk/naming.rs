//! Device path <-> {base disk, partition number} mapping across the kernel's
//! naming schemes.

use super::error::{DiskError, DiskResult};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

const DEV_PREFIX: &str = "/dev/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    Nvme,
    Mmc,
    Loop,
    Virtio,
    Sata,
    Ide,
    Unknown,
}

impl DiskType {
    /// Whether partitions are separated from the disk name by a `p`.
    fn uses_p_separator(&self) -> bool {
        matches!(self, DiskType::Nvme | DiskType::Mmc | DiskType::Loop)
    }
}

impl std::fmt::Display for DiskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiskType::Nvme => "nvme",
            DiskType::Mmc => "mmc",
            DiskType::Loop => "loop",
            DiskType::Virtio => "virtio",
            DiskType::Sata => "sata",
            DiskType::Ide => "ide",
            DiskType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceNode {
    pub path: String,
    pub base_disk: String,
    pub partition_number: Option<u32>,
    pub disk_type: DiskType,
    /// Base disk name without the `/dev/` prefix.
    pub disk_name: String,
}

impl DeviceNode {
    pub fn is_whole_disk(&self) -> bool {
        self.partition_number.is_none()
    }
}

// Order matters: the first matching scheme wins.
static SCHEMES: LazyLock<Vec<(DiskType, Regex)>> = LazyLock::new(|| {
    [
        (DiskType::Nvme, r"^(nvme\d+n\d+)(?:p(\d+))?$"),
        (DiskType::Mmc, r"^(mmcblk\d+)(?:p(\d+))?$"),
        (DiskType::Loop, r"^(loop\d+)(?:p(\d+))?$"),
        (DiskType::Virtio, r"^(vd[a-z]+)(\d+)?$"),
        (DiskType::Sata, r"^(sd[a-z]+)(\d+)?$"),
        (DiskType::Ide, r"^(hd[a-z]+)(\d+)?$"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("valid device regex")))
    .collect()
});

static GENERIC_PARTITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]+\d*[a-z]*)(\d+)$").expect("valid device regex"));

fn parse_number(raw: &str, path: &str) -> DiskResult<u32> {
    raw.parse()
        .map_err(|_| DiskError::parse("device path", format!("partition number in {path}")))
}

/// Split a `/dev/...` path into its base disk and partition number.
pub fn parse(path: &str) -> DiskResult<DeviceNode> {
    let name = path
        .strip_prefix(DEV_PREFIX)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DiskError::parse("device path", format!("{path} is not under /dev")))?;

    let node = |disk_type, disk_name: &str, partition_number| DeviceNode {
        path: path.to_string(),
        base_disk: format!("{DEV_PREFIX}{disk_name}"),
        partition_number,
        disk_type,
        disk_name: disk_name.to_string(),
    };

    for (disk_type, regex) in SCHEMES.iter() {
        if let Some(caps) = regex.captures(name) {
            let partition = caps
                .get(2)
                .map(|m| parse_number(m.as_str(), path))
                .transpose()?;
            return Ok(node(*disk_type, &caps[1], partition));
        }
    }

    if let Some(caps) = GENERIC_PARTITION.captures(name) {
        let partition = parse_number(&caps[2], path)?;
        return Ok(node(DiskType::Unknown, &caps[1], Some(partition)));
    }

    Ok(node(DiskType::Unknown, name, None))
}

/// Inverse of [`parse`]: the device path of partition `number` on `base_disk`.
pub fn get_partition_path(base_disk: &str, number: u32) -> DiskResult<String> {
    let disk = parse(base_disk)?;
    // Unknown schemes: the whole name is the disk.
    let disk_name = match disk.disk_type {
        DiskType::Unknown => base_disk.strip_prefix(DEV_PREFIX).unwrap_or(&disk.disk_name),
        _ => disk.disk_name.as_str(),
    };
    let separator = if disk.disk_type.uses_p_separator()
        || (disk.disk_type == DiskType::Unknown && disk_name.ends_with(|c: char| c.is_ascii_digit()))
    {
        "p"
    } else {
        ""
    };
    Ok(format!("{DEV_PREFIX}{disk_name}{separator}{number}"))
}

pub fn is_whole_disk(path: &str) -> bool {
    parse(path).is_ok_and(|node| node.is_whole_disk())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nvme_partition() {
        let node = parse("/dev/nvme0n1p3").unwrap();
        assert_eq!(node.base_disk, "/dev/nvme0n1");
        assert_eq!(node.disk_type, DiskType::Nvme);
        assert_eq!(node.partition_number, Some(3));
        assert_eq!(node.disk_name, "nvme0n1");
    }

    #[test]
    fn test_round_trip_for_every_scheme() {
        for (path, kind) in [
            ("/dev/nvme0n1p3", DiskType::Nvme),
            ("/dev/mmcblk0p2", DiskType::Mmc),
            ("/dev/loop0p1", DiskType::Loop),
            ("/dev/vda2", DiskType::Virtio),
            ("/dev/sda3", DiskType::Sata),
            ("/dev/hdb1", DiskType::Ide),
        ] {
            let node = parse(path).unwrap();
            assert_eq!(node.disk_type, kind, "{path}");
            let number = node.partition_number.unwrap();
            assert_eq!(get_partition_path(&node.base_disk, number).unwrap(), path);
        }
    }

    #[test]
    fn test_whole_disks() {
        for path in ["/dev/sda", "/dev/nvme1n1", "/dev/mmcblk0", "/dev/vdb", "/dev/loop7"] {
            assert!(is_whole_disk(path), "{path}");
        }
        assert!(!is_whole_disk("/dev/sdb12"));
        assert!(!is_whole_disk("sda"));
    }

    #[test]
    fn test_unknown_names_fall_back_to_trailing_digits() {
        let node = parse("/dev/xvda4").unwrap();
        assert_eq!(node.disk_type, DiskType::Unknown);
        assert_eq!(node.base_disk, "/dev/xvda");
        assert_eq!(node.partition_number, Some(4));
        assert_eq!(get_partition_path("/dev/xvda", 4).unwrap(), "/dev/xvda4");

        let whole = parse("/dev/dm-").unwrap();
        assert!(whole.is_whole_disk());
    }

    #[test]
    fn test_unknown_disk_ending_in_digit_gets_p_separator() {
        assert_eq!(get_partition_path("/dev/nbd0", 2).unwrap(), "/dev/nbd0p2");
        assert_eq!(get_partition_path("/dev/md0p", 1).unwrap(), "/dev/md0p1");
    }

    #[test]
    fn test_partition_path_for_unusual_disk_names() {
        assert_eq!(get_partition_path("/dev/dm-", 1).unwrap(), "/dev/dm-1");
        assert_eq!(get_partition_path("/dev/ü", 3).unwrap(), "/dev/ü3");
        assert!(matches!(
            get_partition_path("sda", 1),
            Err(DiskError::Parse { .. })
        ));
    }

    #[test]
    fn test_rejects_paths_outside_dev() {
        assert!(matches!(parse("sda1"), Err(DiskError::Parse { .. })));
        assert!(matches!(parse("/dev/"), Err(DiskError::Parse { .. })));
    }
}
