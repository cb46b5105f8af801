#![cfg_attr(not(target_os = "linux"), allow(dead_code))]

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// `/proc/diskstats` sectors are always 512 bytes.
const SECTOR_SIZE: u64 = 512;

/// Cumulative block-device I/O counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DiskIo {
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    /// Milliseconds spent reading.
    pub read_time: u64,
    /// Milliseconds spent writing.
    pub write_time: u64,
}

impl DiskIo {
    fn add(mut self, other: &DiskIo) -> Self {
        self.read_count += other.read_count;
        self.write_count += other.write_count;
        self.read_bytes += other.read_bytes;
        self.write_bytes += other.write_bytes;
        self.read_time += other.read_time;
        self.write_time += other.write_time;
        self
    }
}

/// Parses `/proc/diskstats` into per-device counters.
pub(super) fn parse_diskstats(content: &str) -> Result<BTreeMap<String, DiskIo>> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 11 {
                return Err(Error::parse("/proc/diskstats", line));
            }
            let num = |idx: usize| {
                fields[idx]
                    .parse::<u64>()
                    .map_err(|_| Error::parse("/proc/diskstats", line))
            };
            // major minor name reads merged sectors ms writes merged sectors ms ...
            Ok((
                fields[2].to_string(),
                DiskIo {
                    read_count: num(3)?,
                    read_bytes: num(5)? * SECTOR_SIZE,
                    read_time: num(6)?,
                    write_count: num(7)?,
                    write_bytes: num(9)? * SECTOR_SIZE,
                    write_time: num(10)?,
                },
            ))
        })
        .collect()
}

/// Sums the counters of whole devices, leaving partitions out so bytes are
/// not counted twice.
pub(super) fn total(
    per_disk: &BTreeMap<String, DiskIo>,
    is_whole_device: impl Fn(&str) -> bool,
) -> DiskIo {
    per_disk
        .iter()
        .filter(|(name, _)| is_whole_device(name))
        .fold(DiskIo::default(), |acc, (_, io)| acc.add(io))
}

#[cfg(target_os = "linux")]
pub(super) fn read_per_disk() -> Result<BTreeMap<String, DiskIo>> {
    parse_diskstats(&crate::error::read_to_string("/proc/diskstats")?)
}

#[cfg(target_os = "linux")]
pub(super) fn read_total() -> Result<DiskIo> {
    let per_disk = read_per_disk()?;
    Ok(total(&per_disk, |name| {
        std::path::Path::new("/sys/block").join(name).exists()
    }))
}

#[cfg(not(target_os = "linux"))]
pub(super) fn read_per_disk() -> Result<BTreeMap<String, DiskIo>> {
    Err(Error::Unsupported("disk I/O counters"))
}

#[cfg(not(target_os = "linux"))]
pub(super) fn read_total() -> Result<DiskIo> {
    Err(Error::Unsupported("disk I/O counters"))
}
