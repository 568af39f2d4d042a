//! `btrfs subvolume list` parsing

use crate::disk::error::{DiskError, DiskResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubvolumeInfo {
    pub id: u64,
    pub path: String,
}

/// Lines look like `ID 256 gen 7 top level 5 path @home`.
pub fn parse_subvolume_list(output: &str) -> DiskResult<Vec<SubvolumeInfo>> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut tokens = line.split_whitespace();
            let id = match (tokens.next(), tokens.next()) {
                (Some("ID"), Some(id)) => id.parse().ok(),
                _ => None,
            };
            let path = line.split_once(" path ").map(|(_, path)| path.trim());
            match (id, path) {
                (Some(id), Some(path)) => Ok(SubvolumeInfo {
                    id,
                    path: path.to_string(),
                }),
                _ => Err(DiskError::parse("btrfs", format!("unexpected line `{line}`"))),
            }
        })
        .collect()
}

pub fn find_subvolume_id(subvolumes: &[SubvolumeInfo], path: &str) -> Option<u64> {
    subvolumes.iter().find(|s| s.path == path).map(|s| s.id)
}
