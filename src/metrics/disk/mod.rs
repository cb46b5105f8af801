mod fragmentation;
mod io;
mod monitor;

pub use fragmentation::*;
pub use io::DiskIo;
pub use monitor::*;

use chrono::{DateTime, Local};
use serde::Serialize;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Space usage of a mounted filesystem, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f32,
}

impl DiskUsage {
    pub fn new(total: u64, free: u64) -> Self {
        let used = total.saturating_sub(free);
        Self {
            total,
            used,
            free,
            percent: crate::metrics::memory::percent(used, total),
        }
    }

    pub fn total_gb(&self) -> f64 {
        self.total as f64 / GIB
    }

    pub fn used_gb(&self) -> f64 {
        self.used as f64 / GIB
    }

    pub fn free_gb(&self) -> f64 {
        self.free as f64 / GIB
    }
}

/// A mounted partition. Inaccessible mounts are still listed, with
/// `usage` absent and `error` set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionInfo {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub removable: bool,
    pub usage: Option<DiskUsage>,
    pub error: Option<String>,
}

/// Cumulative I/O counters plus the throughput since the previous reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiskIoSnapshot {
    pub counters: DiskIo,
    /// Bytes per second.
    pub read_speed: f64,
    /// Bytes per second.
    pub write_speed: f64,
}

impl DiskIoSnapshot {
    pub fn read_speed_mb(&self) -> f64 {
        self.read_speed / MIB
    }

    pub fn write_speed_mb(&self) -> f64 {
        self.write_speed / MIB
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskSnapshot {
    pub timestamp: DateTime<Local>,
    pub partitions: Vec<PartitionInfo>,
    /// Absent where the platform exposes no global I/O counters.
    pub io_counters: Option<DiskIoSnapshot>,
    pub fragmentation: DiskFragmentation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskSample {
    pub partitions: Vec<PartitionInfo>,
    pub io: Option<DiskIoSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiskHistory {
    pub timestamps: Vec<DateTime<Local>>,
    pub disk_usage: Vec<Vec<PartitionInfo>>,
    pub io_stats: Vec<Option<DiskIoSnapshot>>,
}

impl DiskHistory {
    /// Read and write throughput in MB/s per tick, 0 where counters were absent.
    pub fn speeds_mb(&self) -> (Vec<f64>, Vec<f64>) {
        self.io_stats
            .iter()
            .map(|io| {
                io.map(|io| (io.read_speed_mb(), io.write_speed_mb()))
                    .unwrap_or((0.0, 0.0))
            })
            .unzip()
    }
}
