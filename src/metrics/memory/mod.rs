mod fragmentation;
mod monitor;

pub use fragmentation::*;
pub use monitor::*;

use chrono::{DateTime, Local};
use serde::Serialize;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Physical memory, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct VirtualMemory {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    /// `(total - available) / total`, as a percentage.
    pub percent: f32,
}

impl VirtualMemory {
    pub fn total_gb(&self) -> f64 {
        self.total as f64 / GIB
    }

    pub fn available_gb(&self) -> f64 {
        self.available as f64 / GIB
    }

    pub fn used_gb(&self) -> f64 {
        self.used as f64 / GIB
    }

    pub fn free_gb(&self) -> f64 {
        self.free as f64 / GIB
    }
}

/// Swap space, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SwapMemory {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f32,
    /// Cumulative bytes swapped in from disk, where the kernel reports it.
    pub sin: Option<u64>,
    /// Cumulative bytes swapped out to disk, where the kernel reports it.
    pub sout: Option<u64>,
}

impl SwapMemory {
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

#[derive(Debug, Clone, Serialize)]
pub struct MemorySnapshot {
    pub timestamp: DateTime<Local>,
    pub memory: VirtualMemory,
    pub swap: SwapMemory,
    pub fragmentation: MemoryFragmentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySample {
    pub memory_percent: f32,
    pub memory_used_gb: f64,
    pub swap_percent: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryHistory {
    pub timestamps: Vec<DateTime<Local>>,
    pub memory_percent: Vec<f32>,
    pub memory_used_gb: Vec<f64>,
    pub swap_percent: Vec<f32>,
}

pub(crate) fn percent(part: u64, total: u64) -> f32 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64 * 100.0) as f32
    }
}
