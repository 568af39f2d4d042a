//! `parted <disk> unit B print free` parsing

use crate::disk::error::{DiskError, DiskResult};
use crate::disk::types::{FreeSpaceRegion, PartitionExtent, PartitionTableType, SECTOR_SIZE};

const TOOL: &str = "parted";

/// Flags parted prints in the last column.
const KNOWN_FLAGS: &[&str] = &[
    "boot",
    "esp",
    "bios_grub",
    "legacy_boot",
    "msftdata",
    "msftres",
    "hidden",
    "lvm",
    "raid",
    "swap",
    "lba",
    "diag",
    "prep",
];

/// Everything a byte-unit listing tells us about one disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartedListing {
    pub disk_size: Option<u64>,
    pub sector_size: u64,
    pub table: PartitionTableType,
    pub partitions: Vec<PartitionExtent>,
    /// Unallocated gaps, ordered by start offset.
    pub free: Vec<FreeSpaceRegion>,
}

impl PartedListing {
    /// A freshly labelled disk as far as callers that cannot re-read it know.
    pub fn empty(table: PartitionTableType) -> Self {
        Self {
            disk_size: None,
            sector_size: SECTOR_SIZE,
            table,
            partitions: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn largest_free(&self) -> Option<FreeSpaceRegion> {
        self.free
            .iter()
            .copied()
            .max_by_key(|r| (r.size_bytes(), std::cmp::Reverse(r.start_byte)))
    }

    pub fn partition_numbers(&self) -> Vec<u32> {
        self.partitions.iter().map(|p| p.number).collect()
    }
}

/// parted refuses to print a disk without a label and says so on stderr.
pub fn is_missing_label(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("unrecognised disk label") || stderr.contains("unrecognized disk label")
}

fn parse_bytes(token: &str) -> Option<u64> {
    token.strip_suffix('B')?.parse().ok()
}

/// parted prints inclusive end offsets; regions here are half-open.
fn region(line: &str, start: &str, end: &str) -> DiskResult<FreeSpaceRegion> {
    let (Some(start), Some(end)) = (parse_bytes(start), parse_bytes(end)) else {
        return Err(DiskError::parse(TOOL, format!("bad byte offsets in `{line}`")));
    };
    FreeSpaceRegion::new(start, end + 1)
        .ok_or_else(|| DiskError::parse(TOOL, format!("empty region in `{line}`")))
}

fn parse_header(line: &str, listing: &mut PartedListing) {
    if let Some(rest) = line.strip_prefix("Disk /") {
        // "Disk /dev/sda: 21474836480B"
        listing.disk_size = rest.rsplit(':').next().and_then(|s| parse_bytes(s.trim()));
    } else if let Some(rest) = line.strip_prefix("Sector size (logical/physical):") {
        if let Some(logical) = rest.trim().split('/').next().and_then(parse_bytes) {
            listing.sector_size = logical;
        }
    } else if let Some(rest) = line.strip_prefix("Partition Table:") {
        listing.table = PartitionTableType::from_label(rest);
    }
}

fn parse_partition(line: &str, tokens: &[&str]) -> DiskResult<PartitionExtent> {
    if tokens.len() < 4 {
        return Err(DiskError::parse(TOOL, format!("short partition line `{line}`")));
    }
    let number = tokens[0]
        .parse()
        .map_err(|_| DiskError::parse(TOOL, format!("bad partition number in `{line}`")))?;
    let region = region(line, tokens[1], tokens[2])?;

    // Remaining columns vary by label type (Type/Name are optional), so
    // pick out what is recognisable.
    let rest = &tokens[4..];
    let filesystem = rest
        .iter()
        .find(|t| is_filesystem_name(t))
        .map(|t| t.to_string());
    let flags = rest
        .iter()
        .map(|t| t.trim_end_matches(','))
        .filter(|t| KNOWN_FLAGS.contains(t))
        .map(str::to_string)
        .collect();

    Ok(PartitionExtent {
        number,
        region,
        filesystem,
        flags,
    })
}

fn is_filesystem_name(token: &str) -> bool {
    matches!(
        token,
        "ext2" | "ext3" | "ext4" | "btrfs" | "xfs" | "f2fs" | "fat16" | "fat32" | "ntfs"
            | "exfat" | "hfs" | "hfs+" | "jfs" | "reiserfs" | "udf"
    ) || token.starts_with("linux-swap")
}

/// Parse the full listing. Partition lines start with their number; free
/// lines carry a trailing "Free Space" and no number.
pub fn parse_print_free(output: &str) -> DiskResult<PartedListing> {
    let mut listing = PartedListing::empty(PartitionTableType::Unknown);
    let mut in_table = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("Number") {
            in_table = true;
            continue;
        }
        if !in_table {
            parse_header(trimmed, &mut listing);
            continue;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if trimmed.ends_with("Free Space") {
            if tokens.len() < 3 {
                return Err(DiskError::parse(TOOL, format!("short free-space line `{line}`")));
            }
            listing.free.push(region(line, tokens[0], tokens[1])?);
        } else if tokens[0].starts_with(|c: char| c.is_ascii_digit()) {
            listing.partitions.push(parse_partition(line, &tokens)?);
        }
    }

    listing.free.sort_by_key(|r| r.start_byte);
    listing.partitions.sort_by_key(|p| p.region.start_byte);
    check_disjoint(&listing)?;
    Ok(listing)
}

fn check_disjoint(listing: &PartedListing) -> DiskResult<()> {
    let mut all: Vec<FreeSpaceRegion> = listing
        .free
        .iter()
        .copied()
        .chain(listing.partitions.iter().map(|p| p.region))
        .collect();
    all.sort_by_key(|r| r.start_byte);

    for pair in all.windows(2) {
        if pair[0].overlaps(&pair[1]) {
            return Err(DiskError::parse(
                TOOL,
                format!("overlapping regions {} and {}", pair[0], pair[1]),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPT_LISTING: &str = "\
Model: ATA VBOX HARDDISK (scsi)
Disk /dev/sda: 21474836480B
Sector size (logical/physical): 512B/512B
Partition Table: gpt
Disk Flags:

Number  Start         End           Size          File system  Name     Flags
        17408B        1048575B      1031168B      Free Space
 1      1048576B      537919487B    536870912B    fat32        primary  boot, esp
 2      537919488B    10737418239B  10199498752B  ext4         primary
        10737418240B  21474819583B  10737401344B  Free Space
";

    #[test]
    fn test_parse_gpt_listing() {
        let listing = parse_print_free(GPT_LISTING).unwrap();
        assert_eq!(listing.disk_size, Some(21_474_836_480));
        assert_eq!(listing.sector_size, 512);
        assert_eq!(listing.table, PartitionTableType::Gpt);

        assert_eq!(listing.partitions.len(), 2);
        let esp = &listing.partitions[0];
        assert_eq!(esp.number, 1);
        assert_eq!(esp.region, FreeSpaceRegion::new(1_048_576, 537_919_488).unwrap());
        assert_eq!(esp.filesystem.as_deref(), Some("fat32"));
        assert_eq!(esp.flags, vec!["boot", "esp"]);
        assert_eq!(listing.partitions[1].flags, Vec::<String>::new());

        assert_eq!(listing.free.len(), 2);
        assert_eq!(listing.free[0], FreeSpaceRegion::new(17_408, 1_048_576).unwrap());
        assert_eq!(listing.largest_free().unwrap().start_byte, 10_737_418_240);
        assert_eq!(listing.partition_numbers(), vec![1, 2]);
    }

    #[test]
    fn test_parse_msdos_listing_with_type_column() {
        let output = "\
Disk /dev/vda: 8589934592B
Sector size (logical/physical): 512B/512B
Partition Table: msdos

Number  Start     End          Size         Type     File system     Flags
        32256B    1048575B     1016320B              Free Space
 1      1048576B  1074790399B  1073741824B  primary  linux-swap(v1)  boot
 2      1074790400B  8589934591B  7515144192B  primary  btrfs
";
        let listing = parse_print_free(output).unwrap();
        assert_eq!(listing.table, PartitionTableType::Msdos);
        assert_eq!(listing.partitions[0].filesystem.as_deref(), Some("linux-swap(v1)"));
        assert_eq!(listing.partitions[0].flags, vec!["boot"]);
        assert_eq!(listing.partitions[1].filesystem.as_deref(), Some("btrfs"));
        assert_eq!(listing.free.len(), 1);
    }

    #[test]
    fn test_table_with_no_free_space() {
        let output = "\
Disk /dev/sdb: 1073741824B
Partition Table: gpt

Number  Start     End          Size         File system  Name  Flags
 1      1048576B  1073724927B  1072676352B  ext4
";
        let listing = parse_print_free(output).unwrap();
        assert!(listing.free.is_empty());
        assert!(listing.largest_free().is_none());
    }

    #[test]
    fn test_overlapping_regions_are_rejected() {
        let output = "\
Partition Table: gpt
Number  Start     End        Size      File system  Name  Flags
        0B        2097151B   2097152B  Free Space
 1      1048576B  4194303B   3145728B  ext4
";
        let err = parse_print_free(output).unwrap_err();
        assert!(matches!(err, DiskError::Parse { tool: "parted", .. }));
    }

    #[test]
    fn test_garbage_offsets_are_parse_errors() {
        let output = "\
Number  Start  End  Size  File system  Name  Flags
        abc    def  1B    Free Space
";
        assert!(parse_print_free(output).is_err());
    }

    #[test]
    fn test_missing_label_detection() {
        assert!(is_missing_label("Error: /dev/sdb: unrecognised disk label\n"));
        assert!(is_missing_label("Error: /dev/sdb: Unrecognized disk label"));
        assert!(!is_missing_label("Error: Could not stat device /dev/sdz"));
    }
}
