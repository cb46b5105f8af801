#![cfg_attr(not(target_os = "linux"), allow(dead_code))]

use super::PartitionInfo;
use crate::error::{Error, Result};
use crate::metrics::memory::small_block_ratio;
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of the disk fragmentation probe.
///
/// With `available: true`, `details` carries the raw figures gathered per
/// device. With `available: false`, only `message` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskFragmentation {
    pub available: bool,
    pub fragmentation_percent: Option<f64>,
    pub details: BTreeMap<String, String>,
    pub message: String,
}

impl DiskFragmentation {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            fragmentation_percent: None,
            details: BTreeMap::new(),
            message: message.into(),
        }
    }
}

/// Free-space extent statistics of one ext4 filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtentStats {
    pub groups: u64,
    pub free_blocks: u64,
    pub free_fragments: u64,
    /// Free extents per power-of-two order, summed over all groups.
    pub extents_by_order: Vec<u64>,
}

/// Parses `/proc/fs/ext4/<dev>/mb_groups`:
/// `#0    : 2020  4     1812  [ 0     0     1     0 ... ]`
pub fn parse_mb_groups(content: &str) -> Result<ExtentStats> {
    let mut stats = ExtentStats::default();
    for line in content.lines() {
        let line = line.trim();
        if !line.starts_with('#') || line.starts_with("#group") {
            continue;
        }
        let (_, rest) = line
            .split_once(':')
            .ok_or_else(|| Error::parse("mb_groups", line))?;
        let (head, orders) = rest
            .split_once('[')
            .ok_or_else(|| Error::parse("mb_groups", line))?;

        let head: Vec<u64> = head
            .split_whitespace()
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| Error::parse("mb_groups", line))?;
        let orders: Vec<u64> = orders
            .trim_end_matches(']')
            .split_whitespace()
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| Error::parse("mb_groups", line))?;
        if head.len() < 2 {
            return Err(Error::parse("mb_groups", line));
        }

        stats.groups += 1;
        stats.free_blocks += head[0];
        stats.free_fragments += head[1];
        if stats.extents_by_order.len() < orders.len() {
            stats.extents_by_order.resize(orders.len(), 0);
        }
        for (total, count) in stats.extents_by_order.iter_mut().zip(&orders) {
            *total += count;
        }
    }

    if stats.groups == 0 {
        return Err(Error::parse("mb_groups", "no block groups"));
    }
    Ok(stats)
}

/// Combines per-device extent statistics into one report. The percentage
/// is the share of free extents in the smallest orders, as for memory.
pub fn from_extent_stats(devices: &BTreeMap<String, ExtentStats>) -> DiskFragmentation {
    if devices.is_empty() {
        return DiskFragmentation::unavailable(guidance(&[]));
    }

    let ratio = small_block_ratio(devices.values().map(|s| s.extents_by_order.as_slice()));
    let details = devices
        .iter()
        .map(|(device, stats)| {
            (
                device.clone(),
                format!(
                    "groups={} free_blocks={} free_fragments={}",
                    stats.groups, stats.free_blocks, stats.free_fragments
                ),
            )
        })
        .collect();

    DiskFragmentation {
        available: true,
        fragmentation_percent: Some(ratio * 100.0),
        details,
        message: String::new(),
    }
}

/// Guidance shown when no measurement could be taken.
pub fn guidance(fstypes: &[&str]) -> String {
    if cfg!(target_os = "macos") || fstypes.iter().any(|fs| fs.eq_ignore_ascii_case("apfs")) {
        "APFS uses copy-on-write and does not need traditional defragmentation.".to_string()
    } else if cfg!(windows) {
        "Use the Windows defragmentation tool (defrag /A) for a detailed analysis.".to_string()
    } else if fstypes
        .iter()
        .any(|fs| matches!(*fs, "ext4" | "xfs" | "btrfs" | "f2fs"))
    {
        "Modern ext4/xfs/btrfs filesystems keep fragmentation low and defragment \
         automatically; extent statistics require root access."
            .to_string()
    } else {
        "Fragmentation analysis is not available for these filesystems.".to_string()
    }
}

#[cfg(target_os = "linux")]
pub(super) fn probe(partitions: &[PartitionInfo]) -> DiskFragmentation {
    let mut devices = BTreeMap::new();
    for partition in partitions.iter().filter(|p| p.fstype == "ext4") {
        let Some(name) = partition.device.rsplit('/').next() else {
            continue;
        };
        let path = format!("/proc/fs/ext4/{name}/mb_groups");
        match crate::error::read_to_string(&path).and_then(|c| parse_mb_groups(&c)) {
            Ok(stats) => {
                devices.insert(partition.device.clone(), stats);
            }
            Err(err) => log::debug!("no extent statistics for {}: {err}", partition.device),
        }
    }

    if devices.is_empty() {
        let fstypes: Vec<&str> = partitions.iter().map(|p| p.fstype.as_str()).collect();
        return DiskFragmentation::unavailable(guidance(&fstypes));
    }
    from_extent_stats(&devices)
}

#[cfg(not(target_os = "linux"))]
pub(super) fn probe(partitions: &[PartitionInfo]) -> DiskFragmentation {
    let fstypes: Vec<&str> = partitions.iter().map(|p| p.fstype.as_str()).collect();
    DiskFragmentation::unavailable(guidance(&fstypes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB_GROUPS: &str = "\
#group: free  frags first [ 2^0   2^1   2^2   2^3   2^4   2^5   2^6   2^7   2^8   2^9   2^10  2^11  2^12  2^13  ]
#0    : 2020  4     1812  [ 0     0     1     0     1     1     0     1     1     1     0     1     0     0     ]
#1    : 6000  10    0     [ 4     2     2     2     0     0     0     0     0     0     0     0     0     0     ]
";

    #[test]
    fn parses_groups() {
        let stats = parse_mb_groups(MB_GROUPS).unwrap();
        assert_eq!(stats.groups, 2);
        assert_eq!(stats.free_blocks, 8020);
        assert_eq!(stats.free_fragments, 14);
        assert_eq!(stats.extents_by_order.len(), 14);
        assert_eq!(&stats.extents_by_order[..4], &[4, 2, 3, 2]);
    }

    #[test]
    fn rejects_empty_or_malformed() {
        assert!(parse_mb_groups("#group: free frags first [ 2^0 ]\n").is_err());
        assert!(parse_mb_groups("#0 : 1 x 0 [ 0 ]\n").is_err());
    }

    #[test]
    fn report_from_stats() {
        let stats = parse_mb_groups(MB_GROUPS).unwrap();
        let report = from_extent_stats(&BTreeMap::from([("/dev/sda1".to_string(), stats)]));
        assert!(report.available);
        // small = 4 + 2 + 3, large = 2 + 1 + 1 + 1 + 1 + 1 + 1
        let expected = 9.0 / 17.0 * 100.0;
        assert!((report.fragmentation_percent.unwrap() - expected).abs() < 1e-9);
        assert!(report.details["/dev/sda1"].contains("free_blocks=8020"));
    }

    #[test]
    fn no_devices_is_unavailable() {
        let report = from_extent_stats(&BTreeMap::new());
        assert!(!report.available);
        assert!(report.fragmentation_percent.is_none());
        assert!(!report.message.is_empty());
    }
}
