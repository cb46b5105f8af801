#![cfg_attr(not(target_os = "linux"), allow(dead_code))]

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Allocation orders counted as "small" free blocks (4 KiB, 8 KiB, 16 KiB).
pub const SMALL_ORDERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentationMethod {
    /// Free blocks per allocation order from `/proc/buddyinfo`.
    BuddyInfo,
    /// Speculative versus free pages from `vm_stat`.
    VmStat,
    /// `1 - free / available`.
    FreeVsAvailable,
}

/// Free block counts of one memory zone, indexed by allocation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuddyZone {
    pub node: String,
    pub name: String,
    pub blocks: Vec<u64>,
}

/// Best-effort fragmentation estimate. `ratio` is in `[0, 1]`; higher means
/// free memory is split into smaller pieces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryFragmentation {
    pub ratio: f64,
    pub method: FragmentationMethod,
    /// True when a kernel or platform interface provided the data,
    /// false for the free-versus-available approximation.
    pub available: bool,
    pub zones: Vec<BuddyZone>,
    pub details: BTreeMap<String, u64>,
}

impl MemoryFragmentation {
    pub fn from_zones(zones: Vec<BuddyZone>) -> Self {
        Self {
            ratio: small_block_ratio(zones.iter().map(|z| z.blocks.as_slice())),
            method: FragmentationMethod::BuddyInfo,
            available: true,
            zones,
            details: BTreeMap::new(),
        }
    }

    pub fn from_vm_stat(stats: BTreeMap<String, u64>) -> Self {
        let free = stats.get("Pages free").copied().unwrap_or(0);
        let speculative = stats.get("Pages speculative").copied().unwrap_or(0);
        let ratio = if free + speculative > 0 {
            speculative as f64 / (free + speculative + 1) as f64
        } else {
            0.0
        };
        Self {
            ratio,
            method: FragmentationMethod::VmStat,
            available: true,
            zones: Vec::new(),
            details: stats,
        }
    }

    pub fn from_free_available(free: u64, available: u64) -> Self {
        let ratio = if available > 0 {
            (1.0 - free as f64 / available as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            ratio,
            method: FragmentationMethod::FreeVsAvailable,
            available: false,
            zones: Vec::new(),
            details: BTreeMap::from([
                ("free".to_string(), free),
                ("available".to_string(), available),
            ]),
        }
    }
}

/// `small / (small + large)` over per-order free block counts, where the
/// first [`SMALL_ORDERS`] orders are small.
pub fn small_block_ratio<'a>(orders: impl IntoIterator<Item = &'a [u64]>) -> f64 {
    let (small, large) = orders.into_iter().fold((0u64, 0u64), |(small, large), blocks| {
        let split = blocks.len().min(SMALL_ORDERS);
        (
            small + blocks[..split].iter().sum::<u64>(),
            large + blocks[split..].iter().sum::<u64>(),
        )
    });
    if small + large == 0 {
        0.0
    } else {
        small as f64 / (small + large) as f64
    }
}

/// Parses `/proc/buddyinfo`:
/// `Node 0, zone   Normal   1046    527    128 ...`
pub fn parse_buddyinfo(content: &str) -> Vec<BuddyZone> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            let blocks = parts[4..]
                .iter()
                .map(|count| count.parse::<u64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .ok()?;
            Some(BuddyZone {
                node: parts[1].trim_end_matches(',').to_string(),
                name: parts[3].to_string(),
                blocks,
            })
        })
        .collect()
}

/// Parses `vm_stat` output lines such as `Pages free:   12345.`
pub fn parse_vm_stat(content: &str) -> BTreeMap<String, u64> {
    content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let value = value.trim().trim_end_matches('.').parse::<u64>().ok()?;
            Some((key.trim().to_string(), value))
        })
        .collect()
}

#[cfg(target_os = "linux")]
pub(super) fn probe() -> Result<MemoryFragmentation> {
    let zones = parse_buddyinfo(&crate::error::read_to_string("/proc/buddyinfo")?);
    if zones.is_empty() {
        return Err(Error::parse("/proc/buddyinfo", "no zones"));
    }
    Ok(MemoryFragmentation::from_zones(zones))
}

#[cfg(target_os = "macos")]
pub(super) fn probe() -> Result<MemoryFragmentation> {
    let output =
        crate::probe::run_command("vm_stat", &[], std::time::Duration::from_secs(5))?;
    let stats = parse_vm_stat(&output);
    if stats.is_empty() {
        return Err(Error::parse("vm_stat", output));
    }
    Ok(MemoryFragmentation::from_vm_stat(stats))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub(super) fn probe() -> Result<MemoryFragmentation> {
    Err(Error::Unsupported("memory fragmentation statistics"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDDYINFO: &str = "\
Node 0, zone      DMA      1      1      1      0      2      1      1      0      1      1      3
Node 0, zone    DMA32      4      5      3      2      2      1      1      2      1      2    500
Node 0, zone   Normal   2000   1000    500     40     30     20     10      5      2      1      0
";

    #[test]
    fn parses_zones() {
        let zones = parse_buddyinfo(BUDDYINFO);
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[2].name, "Normal");
        assert_eq!(zones[2].node, "0");
        assert_eq!(zones[2].blocks.len(), 11);
        assert_eq!(zones[0].blocks[10], 3);
    }

    #[test]
    fn skips_malformed_lines() {
        let zones = parse_buddyinfo("garbage\nNode 0, zone Normal 1 x 3\nNode 0, zone DMA 1 2\n");
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "DMA");
    }

    #[test]
    fn ratio_counts_three_smallest_orders() {
        let zones = parse_buddyinfo(BUDDYINFO);
        let fragmentation = MemoryFragmentation::from_zones(zones);
        let small = (1 + 1 + 1) + (4 + 5 + 3) + (2000 + 1000 + 500);
        let large = (2 + 1 + 1 + 1 + 1 + 3) + (2 + 2 + 1 + 1 + 2 + 1 + 2 + 500)
            + (40 + 30 + 20 + 10 + 5 + 2 + 1);
        let expected = small as f64 / (small + large) as f64;
        assert!((fragmentation.ratio - expected).abs() < 1e-12);
        assert!(fragmentation.available);
        assert_eq!(fragmentation.method, FragmentationMethod::BuddyInfo);
    }

    #[test]
    fn short_zones_are_all_small() {
        let ratio = small_block_ratio([&[5u64, 5][..], &[0, 0, 0, 10][..]]);
        assert!((ratio - 0.5).abs() < 1e-12);
        assert_eq!(small_block_ratio([&[][..]]), 0.0);
    }

    #[test]
    fn fallback_formula() {
        let fragmentation = MemoryFragmentation::from_free_available(2_000, 8_000);
        assert!((fragmentation.ratio - 0.75).abs() < 1e-12);
        assert!(!fragmentation.available);
        assert_eq!(fragmentation.details["free"], 2_000);
    }

    #[test]
    fn fallback_stays_in_range() {
        assert_eq!(MemoryFragmentation::from_free_available(9, 0).ratio, 0.0);
        assert_eq!(MemoryFragmentation::from_free_available(10, 5).ratio, 0.0);
    }

    #[test]
    fn vm_stat_ratio() {
        let output = "Mach Virtual Memory Statistics: (page size of 16384 bytes)\n\
                      Pages free:                               3000.\n\
                      Pages active:                           100000.\n\
                      Pages speculative:                        1000.\n";
        let stats = parse_vm_stat(output);
        assert_eq!(stats.len(), 3);
        let fragmentation = MemoryFragmentation::from_vm_stat(stats);
        assert!((fragmentation.ratio - 1000.0 / 4001.0).abs() < 1e-12);
        assert_eq!(fragmentation.method, FragmentationMethod::VmStat);
    }
}
