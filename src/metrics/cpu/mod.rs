mod monitor;
mod times;

pub use monitor::*;
pub use times::CpuTimes;
pub(crate) use times::clock_ticks;

use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuCount {
    pub logical: usize,
    /// Absent when the platform does not expose core topology.
    pub physical: Option<usize>,
}

/// Clock frequencies in MHz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuFrequency {
    pub current: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Share of CPU time spent in each mode over the sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuTimesPercent {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CpuSnapshot {
    pub timestamp: DateTime<Local>,
    pub usage_percent: f32,
    /// Indexed by logical core.
    pub per_cpu_percent: Vec<f32>,
    pub cpu_count: CpuCount,
    pub frequency: Option<CpuFrequency>,
    pub times_percent: Option<CpuTimesPercent>,
    /// Cumulative seconds since boot.
    pub times: Option<CpuTimes>,
    /// Absent where the platform has no load average.
    pub load_average: Option<LoadAverage>,
}

/// One recorder tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuSample {
    pub usage: f32,
    pub per_core: Vec<f32>,
}

/// Index-aligned copy of the CPU history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CpuHistory {
    pub timestamps: Vec<DateTime<Local>>,
    pub cpu_usage: Vec<f32>,
    /// One entry per tick, each as long as the core count at capture time.
    pub per_cpu_usage: Vec<Vec<f32>>,
}
