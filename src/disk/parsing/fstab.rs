//! Reading fstab text back for install-time replay

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// First field: `UUID=...`, `LABEL=...`, `PARTUUID=...` or a device path.
    pub spec: String,
    pub mountpoint: String,
    pub fstype: String,
    pub options: String,
    pub dump: u32,
    pub pass: u32,
}

/// Which part of a Btrfs filesystem an entry mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BtrfsSelector {
    Subvol(String),
    SubvolId(String),
    TopLevel,
}

impl BtrfsSelector {
    /// Extra `-o` option for `mount`, if any.
    pub fn mount_option(&self) -> Option<String> {
        match self {
            BtrfsSelector::Subvol(name) => Some(format!("subvol={name}")),
            BtrfsSelector::SubvolId(id) => Some(format!("subvolid={id}")),
            BtrfsSelector::TopLevel => None,
        }
    }
}

static SUBVOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|,)\s*subvol=([^,\s]+)").expect("valid subvol regex"));
static SUBVOLID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|,)\s*subvolid=(\d+)").expect("valid subvolid regex"));

impl FstabEntry {
    pub fn btrfs_selector(&self) -> BtrfsSelector {
        btrfs_selector(&self.options)
    }

    pub fn is_btrfs(&self) -> bool {
        self.fstype == "btrfs"
    }
}

pub fn btrfs_selector(options: &str) -> BtrfsSelector {
    if let Some(caps) = SUBVOL.captures(options) {
        return BtrfsSelector::Subvol(caps[1].to_string());
    }
    // Hand-edited files sometimes separate options with spaces or leave
    // stray whitespace; fall back to a plain substring scan.
    if let Some(idx) = options.find("subvol=") {
        let value: String = options[idx + "subvol=".len()..]
            .chars()
            .take_while(|c| *c != ',' && !c.is_whitespace())
            .collect();
        if !value.is_empty() {
            return BtrfsSelector::Subvol(value);
        }
    }
    if let Some(caps) = SUBVOLID.captures(options) {
        return BtrfsSelector::SubvolId(caps[1].to_string());
    }
    BtrfsSelector::TopLevel
}

/// Parse fstab text. Comments, blank lines and lines with fewer than four
/// fields are skipped; missing dump/pass default to 0.
pub fn parse_fstab(content: &str) -> Vec<FstabEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let number = |i: usize| fields.get(i).and_then(|f| f.parse().ok()).unwrap_or(0);
            Some(FstabEntry {
                spec: fields[0].to_string(),
                mountpoint: fields[1].to_string(),
                fstype: fields[2].to_string(),
                options: fields[3].to_string(),
                dump: number(4),
                pass: number(5),
            })
        })
        .collect()
}
