//! `lsblk --json` parsing for the block-device listing

use crate::disk::error::{DiskError, DiskResult};
use serde::{Deserialize, Deserializer, Serialize};

/// Columns requested from lsblk; sizes in bytes (`-b`).
pub const LSBLK_COLUMNS: &str = "NAME,SIZE,TYPE,MOUNTPOINT,LABEL,FSTYPE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    pub name: String,
    #[serde(deserialize_with = "size_from_number_or_string", default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub mountpoint: Option<String>,
    pub label: Option<String>,
    pub fstype: Option<String>,
    #[serde(default)]
    pub children: Vec<BlockDevice>,
}

impl BlockDevice {
    pub fn path(&self) -> String {
        format!("/dev/{}", self.name)
    }

    pub fn is_disk(&self) -> bool {
        self.kind == "disk"
    }
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<BlockDevice>,
}

// Older util-linux prints sizes as strings even with `-b`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Number(u64),
    Text(String),
}

fn size_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawSize>::deserialize(deserializer)? {
        None => Ok(0),
        Some(RawSize::Number(n)) => Ok(n),
        Some(RawSize::Text(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

pub fn parse_lsblk(json: &str) -> DiskResult<Vec<BlockDevice>> {
    let output: LsblkOutput =
        serde_json::from_str(json).map_err(|e| DiskError::parse("lsblk", e.to_string()))?;
    Ok(output.blockdevices)
}

/// Whole disks worth offering as install targets: no loop, rom or zram devices.
pub fn installable_disks(devices: Vec<BlockDevice>) -> Vec<BlockDevice> {
    devices
        .into_iter()
        .filter(|d| d.is_disk() && !d.name.starts_with("zram"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
   "blockdevices": [
      {"name": "loop0", "size": 834519040, "type": "loop", "mountpoint": "/run/archiso/airootfs", "label": null, "fstype": "squashfs"},
      {"name": "sda", "size": 21474836480, "type": "disk", "mountpoint": null, "label": null, "fstype": null,
         "children": [
            {"name": "sda1", "size": 536870912, "type": "part", "mountpoint": null, "label": "EFI", "fstype": "vfat"},
            {"name": "sda2", "size": 20936916992, "type": "part", "mountpoint": null, "label": null, "fstype": "btrfs"}
         ]
      },
      {"name": "sr0", "size": "861929472", "type": "rom", "mountpoint": "/run/archiso/bootmnt", "label": "ARCH_202410", "fstype": "iso9660"},
      {"name": "zram0", "size": 4294967296, "type": "disk", "mountpoint": "[SWAP]", "label": null, "fstype": null}
   ]
}"#;

    #[test]
    fn test_parse_tree() {
        let devices = parse_lsblk(SAMPLE).unwrap();
        assert_eq!(devices.len(), 4);
        let sda = &devices[1];
        assert_eq!(sda.path(), "/dev/sda");
        assert_eq!(sda.size, 21_474_836_480);
        assert_eq!(sda.children.len(), 2);
        assert_eq!(sda.children[0].label.as_deref(), Some("EFI"));
        assert_eq!(sda.children[1].fstype.as_deref(), Some("btrfs"));
        assert!(devices[0].children.is_empty());
    }

    #[test]
    fn test_string_sizes_are_accepted() {
        let devices = parse_lsblk(SAMPLE).unwrap();
        assert_eq!(devices[2].size, 861_929_472);
    }

    #[test]
    fn test_installable_disks_skip_loop_rom_and_zram() {
        let disks = installable_disks(parse_lsblk(SAMPLE).unwrap());
        let names: Vec<&str> = disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sda"]);
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        assert!(matches!(
            parse_lsblk("{\"blockdevices\": 3}"),
            Err(DiskError::Parse { tool: "lsblk", .. })
        ));
    }
}
