//! Core data structures shared by the analyzer, planner and parsers

use serde::{Deserialize, Serialize};

/// Logical sector size every partition boundary is aligned to.
pub const SECTOR_SIZE: u64 = 512;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value - (value % alignment)
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Partition table type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
    Gpt,
    Msdos,
    Unknown,
}

impl PartitionTableType {
    /// Label name understood by `parted mklabel`.
    pub fn label(&self) -> &'static str {
        match self {
            PartitionTableType::Gpt => "gpt",
            PartitionTableType::Msdos => "msdos",
            PartitionTableType::Unknown => "unknown",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "gpt" => PartitionTableType::Gpt,
            "msdos" | "dos" | "mbr" => PartitionTableType::Msdos,
            _ => PartitionTableType::Unknown,
        }
    }
}

impl std::fmt::Display for PartitionTableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionTableType::Gpt => write!(f, "GPT"),
            PartitionTableType::Msdos => write!(f, "MBR"),
            PartitionTableType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A contiguous byte range on a disk, `[start_byte, end_byte)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FreeSpaceRegion {
    pub start_byte: u64,
    pub end_byte: u64,
}

impl FreeSpaceRegion {
    /// Returns `None` unless `end_byte > start_byte`.
    pub fn new(start_byte: u64, end_byte: u64) -> Option<Self> {
        (end_byte > start_byte).then_some(Self {
            start_byte,
            end_byte,
        })
    }

    pub fn size_bytes(&self) -> u64 {
        self.end_byte - self.start_byte
    }

    pub fn overlaps(&self, other: &FreeSpaceRegion) -> bool {
        self.start_byte < other.end_byte && other.start_byte < self.end_byte
    }

    pub fn intersection(&self, other: &FreeSpaceRegion) -> Option<FreeSpaceRegion> {
        FreeSpaceRegion::new(
            self.start_byte.max(other.start_byte),
            self.end_byte.min(other.end_byte),
        )
    }
}

impl std::fmt::Display for FreeSpaceRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}..{} ({})",
            self.start_byte,
            self.end_byte,
            format_size(self.size_bytes())
        )
    }
}

/// An existing partition as reported by the partition-table tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionExtent {
    pub number: u32,
    pub region: FreeSpaceRegion,
    pub filesystem: Option<String>,
    pub flags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_up(1_048_000, SECTOR_SIZE), 1_048_064);
        assert_eq!(align_up(1_048_576, SECTOR_SIZE), 1_048_576);
        assert_eq!(align_down(1_048_575, SECTOR_SIZE), 1_048_064);
        assert_eq!(align_down(7, 0), 7);
    }

    #[test]
    fn test_region_requires_positive_length() {
        assert!(FreeSpaceRegion::new(10, 10).is_none());
        assert!(FreeSpaceRegion::new(10, 5).is_none());
        assert_eq!(FreeSpaceRegion::new(0, 512).unwrap().size_bytes(), 512);
    }

    #[test]
    fn test_intersection() {
        let a = FreeSpaceRegion::new(0, 100).unwrap();
        let b = FreeSpaceRegion::new(50, 200).unwrap();
        assert_eq!(a.intersection(&b), FreeSpaceRegion::new(50, 100));
        let c = FreeSpaceRegion::new(100, 200).unwrap();
        assert!(!a.overlaps(&c));
        assert!(a.intersection(&c).is_none());
    }

    #[test]
    fn test_table_labels() {
        assert_eq!(PartitionTableType::from_label("dos"), PartitionTableType::Msdos);
        assert_eq!(PartitionTableType::from_label("GPT"), PartitionTableType::Gpt);
        assert_eq!(PartitionTableType::Msdos.label(), "msdos");
    }
}
