//! Size requests such as `"512MiB"`, `"20GB"` or `"100%"`.

use super::error::{DiskError, DiskResult};
use serde::{Serialize, Serializer};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    /// The whole selected region.
    All,
    Bytes(u64),
}

const UNITS: &[(&str, u64)] = &[
    ("tib", 1 << 40),
    ("gib", 1 << 30),
    ("mib", 1 << 20),
    ("kib", 1 << 10),
    ("tb", 1_000_000_000_000),
    ("gb", 1_000_000_000),
    ("mb", 1_000_000),
    ("kb", 1_000),
    ("b", 1),
];

impl SizeSpec {
    pub const fn mib(n: u64) -> Self {
        SizeSpec::Bytes(n << 20)
    }

    pub const fn gib(n: u64) -> Self {
        SizeSpec::Bytes(n << 30)
    }

    pub fn bytes(&self) -> Option<u64> {
        match self {
            SizeSpec::All => None,
            SizeSpec::Bytes(n) => Some(*n),
        }
    }
}

impl FromStr for SizeSpec {
    type Err = DiskError;

    fn from_str(s: &str) -> DiskResult<Self> {
        let trimmed = s.trim();
        if trimmed == "100%" {
            return Ok(SizeSpec::All);
        }

        let invalid = || DiskError::parse("size", format!("invalid size `{s}`"));
        let lower = trimmed.to_ascii_lowercase();
        let (number, factor) = UNITS
            .iter()
            .find_map(|(unit, factor)| lower.strip_suffix(unit).map(|n| (n.trim(), *factor)))
            .ok_or_else(invalid)?;

        let value: f64 = number.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid());
        }
        Ok(SizeSpec::Bytes((value * factor as f64).round() as u64))
    }
}

impl std::fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeSpec::All => write!(f, "100%"),
            SizeSpec::Bytes(n) => write!(f, "{n}B"),
        }
    }
}

impl Serialize for SizeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
