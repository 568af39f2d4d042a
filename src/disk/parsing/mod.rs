//! Pure parsers from captured tool output to structured data. Nothing here
//! runs a process.

pub mod btrfs;
pub mod fstab;
pub mod lsblk;
pub mod parted;

pub use btrfs::{SubvolumeInfo, find_subvolume_id, parse_subvolume_list};
pub use fstab::{BtrfsSelector, FstabEntry, parse_fstab};
pub use lsblk::{BlockDevice, LSBLK_COLUMNS, installable_disks, parse_lsblk};
pub use parted::{PartedListing, is_missing_label, parse_print_free};
