//! Persisted device -> mount configuration mapping.

use super::btrfs::SUBVOLUME_PLAN;
use super::error::{DiskError, DiskResult, MissingRequirement};
use super::naming;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub bootable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fstype: Option<String>,
}

impl PartitionConfig {
    pub fn is_root(&self) -> bool {
        self.mountpoint.as_deref() == Some("/")
    }

    pub fn is_btrfs(&self) -> bool {
        self.fstype
            .as_deref()
            .is_some_and(|fs| fs.eq_ignore_ascii_case("btrfs"))
    }

    /// A Btrfs root expands into the subvolume layout.
    pub fn is_btrfs_root(&self) -> bool {
        self.is_root() && self.is_btrfs()
    }

    /// Every mountpoint this entry ends up owning in the generated fstab.
    pub fn claimed_mountpoints(&self) -> Vec<&str> {
        if self.is_btrfs_root() {
            SUBVOLUME_PLAN.iter().map(|(_, mp)| *mp).collect()
        } else {
            self.mountpoint
                .as_deref()
                .filter(|mp| mp.starts_with('/'))
                .into_iter()
                .collect()
        }
    }
}

/// Write through a temporary file in the same directory and rename it into
/// place, so readers see either the old or the new contents.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Ordered mapping of device path to its configuration, backed by one JSON
/// document. A missing file is an empty store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionConfigStore {
    path: PathBuf,
    entries: BTreeMap<String, PartitionConfig>,
}

impl PartitionConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> DiskResult<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn save(&self) -> DiskResult<()> {
        let mut json = serde_json::to_vec_pretty(&self.entries)?;
        json.push(b'\n');
        write_atomic(&self.path, &json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &BTreeMap<String, PartitionConfig> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, device: &str) -> Option<&PartitionConfig> {
        self.entries.get(device)
    }

    /// Insert or replace, rejecting mountpoints another device already owns.
    pub fn upsert(&mut self, device: &str, config: PartitionConfig) -> DiskResult<()> {
        self.check_available(Some(device), &config)?;
        self.entries.insert(device.to_string(), config);
        Ok(())
    }

    /// Apply `edit` to the device's entry (created empty if absent). The
    /// store is unchanged when the edited entry would conflict.
    pub fn update(
        &mut self,
        device: &str,
        edit: impl FnOnce(&mut PartitionConfig),
    ) -> DiskResult<()> {
        let mut config = self.entries.get(device).cloned().unwrap_or_default();
        edit(&mut config);
        self.upsert(device, config)
    }

    pub fn remove(&mut self, device: &str) -> Option<PartitionConfig> {
        self.entries.remove(device)
    }

    /// Drop every partition entry on `disk` (and the disk itself). Returns
    /// the removed device paths.
    pub fn remove_disk(&mut self, disk: &str) -> Vec<String> {
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|device| {
                device.as_str() == disk
                    || naming::parse(device).is_ok_and(|node| node.base_disk == disk)
            })
            .cloned()
            .collect();
        for device in &doomed {
            self.entries.remove(device);
        }
        doomed
    }

    pub fn root(&self) -> Option<(&str, &PartitionConfig)> {
        self.entries
            .iter()
            .find(|(_, config)| config.is_root())
            .map(|(device, config)| (device.as_str(), config))
    }

    /// Fail with the device already owning a mountpoint `config` would
    /// claim. `owner` is the device being edited, if it exists yet.
    pub fn check_available(&self, owner: Option<&str>, config: &PartitionConfig) -> DiskResult<()> {
        let wanted = config.claimed_mountpoints();
        for (other, existing) in &self.entries {
            if Some(other.as_str()) == owner {
                continue;
            }
            if let Some(mountpoint) = existing
                .claimed_mountpoints()
                .into_iter()
                .find(|mp| wanted.contains(mp))
            {
                return Err(DiskError::MountpointInUse {
                    mountpoint: mountpoint.to_string(),
                    device: other.clone(),
                });
            }
        }
        Ok(())
    }

    /// Exactly one root and at least one bootable entry.
    pub fn missing_requirements(&self) -> Vec<MissingRequirement> {
        let roots = self.entries.values().filter(|c| c.is_root()).count();
        let mut missing = Vec::new();
        match roots {
            0 => missing.push(MissingRequirement::RootMountpoint),
            1 => {}
            _ => missing.push(MissingRequirement::DuplicateRoot),
        }
        if !self.entries.values().any(|c| c.bootable) {
            missing.push(MissingRequirement::BootablePartition);
        }
        missing
    }

    pub fn validate(&self) -> DiskResult<()> {
        let missing = self.missing_requirements();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DiskError::MissingConfiguration(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mountpoint: Option<&str>, bootable: bool, fstype: Option<&str>) -> PartitionConfig {
        PartitionConfig {
            mountpoint: mountpoint.map(str::to_string),
            bootable,
            fstype: fstype.map(str::to_string),
        }
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/partitions.json");

        let mut store = PartitionConfigStore::new(&path);
        store
            .upsert("/dev/nvme0n1p1", entry(Some("/boot/efi"), true, Some("vfat")))
            .unwrap();
        store
            .upsert("/dev/nvme0n1p2", entry(Some("/"), false, Some("btrfs")))
            .unwrap();
        store.upsert("/dev/nvme0n1p3", entry(None, false, Some("swap"))).unwrap();
        store.save().unwrap();

        let loaded = PartitionConfigStore::load(&path).unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_json_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partitions.json");
        let mut store = PartitionConfigStore::new(&path);
        store.upsert("/dev/sda1", entry(Some("/"), true, None)).unwrap();
        store.save().unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"/dev/sda1": {"mountpoint": "/", "bootable": true}})
        );
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionConfigStore::load(dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partitions.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            PartitionConfigStore::load(&path),
            Err(DiskError::Json(_))
        ));
    }

    #[test]
    fn test_validation_gate() {
        let mut store = PartitionConfigStore::new("/unused");
        assert_eq!(
            store.missing_requirements(),
            vec![
                MissingRequirement::RootMountpoint,
                MissingRequirement::BootablePartition
            ]
        );

        store.upsert("/dev/sda2", entry(Some("/"), false, Some("ext4"))).unwrap();
        assert_eq!(
            store.missing_requirements(),
            vec![MissingRequirement::BootablePartition]
        );

        store.update("/dev/sda1", |c| c.bootable = true).unwrap();
        assert!(store.validate().is_ok());
    }

    #[test]
    fn test_duplicate_mountpoints_are_rejected() {
        let mut store = PartitionConfigStore::new("/unused");
        store.upsert("/dev/sda1", entry(Some("/boot"), true, None)).unwrap();
        let err = store
            .upsert("/dev/sda2", entry(Some("/boot"), false, None))
            .unwrap_err();
        assert!(matches!(
            err,
            DiskError::MountpointInUse { ref device, .. } if device == "/dev/sda1"
        ));
        assert!(store.get("/dev/sda2").is_none());

        // Re-saving the same device is fine.
        store.upsert("/dev/sda1", entry(Some("/boot"), false, None)).unwrap();
    }

    #[test]
    fn test_btrfs_root_claims_its_subvolume_mountpoints() {
        let mut store = PartitionConfigStore::new("/unused");
        store.upsert("/dev/sda2", entry(Some("/"), false, Some("btrfs"))).unwrap();
        let err = store
            .upsert("/dev/sda3", entry(Some("/home"), false, Some("ext4")))
            .unwrap_err();
        assert!(matches!(err, DiskError::MountpointInUse { ref mountpoint, .. } if mountpoint == "/home"));

        // Swap has no real mountpoint and never conflicts.
        store.upsert("/dev/sda4", entry(None, false, Some("swap"))).unwrap();
        store.upsert("/dev/sda5", entry(None, false, Some("swap"))).unwrap();
    }

    #[test]
    fn test_remove_disk_drops_only_its_partitions() {
        let mut store = PartitionConfigStore::new("/unused");
        store.upsert("/dev/sda1", entry(Some("/boot"), true, None)).unwrap();
        store.upsert("/dev/sda2", entry(Some("/"), false, None)).unwrap();
        store.upsert("/dev/sdb1", entry(Some("/data"), false, None)).unwrap();

        let removed = store.remove_disk("/dev/sda");
        assert_eq!(removed, vec!["/dev/sda1", "/dev/sda2"]);
        assert_eq!(store.entries().len(), 1);
        assert!(store.get("/dev/sdb1").is_some());
    }
}
