use super::{times, CpuCount, CpuFrequency, CpuHistory, CpuSample, CpuSnapshot, LoadAverage};
use crate::config::MonitorSettings;
use crate::metrics::history::HistoryBuffer;
use crate::metrics::recorder::{Recorder, Sampler};
use crate::metrics::{record_into, SharedHistory};
use chrono::Local;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use sysinfo::System;

/// Processor utilisation: live snapshots plus a background usage history.
#[derive(Debug)]
pub struct CpuMonitor {
    settings: MonitorSettings,
    history: SharedHistory<CpuSample>,
    recorder: Recorder,
}

impl Default for CpuMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::new(3600, 1))
    }
}

impl CpuMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            history: Arc::new(Mutex::new(HistoryBuffer::new(settings.capacity()))),
            recorder: Recorder::new("cpu"),
        }
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    /// Reads the current CPU state. Blocks for one sysinfo sampling window
    /// because usage is a delta between two readings.
    pub fn get_current_stats(&self) -> CpuSnapshot {
        let mut system = System::new();
        system.refresh_cpu_all();
        let times_before = times::read_cpu_times().ok();

        thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);

        system.refresh_cpu_usage();
        let times_after = times::read_cpu_times().ok();

        let per_cpu_percent: Vec<f32> = system
            .cpus()
            .iter()
            .map(|cpu| cpu.cpu_usage().clamp(0.0, 100.0))
            .collect();

        CpuSnapshot {
            timestamp: Local::now(),
            usage_percent: system.global_cpu_usage().clamp(0.0, 100.0),
            cpu_count: CpuCount {
                logical: per_cpu_percent.len(),
                physical: physical_core_count(),
            },
            per_cpu_percent,
            frequency: frequency(&system),
            times_percent: match (times_before, times_after) {
                (Some(before), Some(after)) => after.percent_since(&before),
                _ => None,
            },
            times: times_after,
            load_average: load_average(),
        }
    }

    pub fn get_history(&self) -> CpuHistory {
        let history = self.history.lock();
        CpuHistory {
            timestamps: history.timestamps(),
            cpu_usage: history.series(|s| s.usage),
            per_cpu_usage: history.series(|s| s.per_core.clone()),
        }
    }

    pub fn start_monitoring(&mut self) {
        let sampler = CpuSampler {
            system: System::new(),
        };
        self.recorder.start(
            self.settings.update_interval(),
            sampler,
            record_into(&self.history),
        );
    }

    pub fn stop_monitoring(&mut self) {
        self.recorder.stop();
    }

    pub fn is_monitoring(&self) -> bool {
        self.recorder.is_running()
    }
}

struct CpuSampler {
    system: System,
}

impl Sampler for CpuSampler {
    type Sample = CpuSample;

    fn prime(&mut self) {
        self.system.refresh_cpu_usage();
    }

    fn sample(&mut self) -> Option<CpuSample> {
        self.system.refresh_cpu_usage();
        let per_core: Vec<f32> = self
            .system
            .cpus()
            .iter()
            .map(|cpu| cpu.cpu_usage().clamp(0.0, 100.0))
            .collect();
        if per_core.is_empty() {
            return None;
        }

        let usage = self.system.global_cpu_usage().clamp(0.0, 100.0);
        debug!("cpu usage {usage:.1}%");
        Some(CpuSample { usage, per_core })
    }
}

fn physical_core_count() -> Option<usize> {
    match num_cpus::get_physical() {
        0 => None,
        count => Some(count),
    }
}

fn frequency(system: &System) -> Option<CpuFrequency> {
    let current = system.cpus().first()?.frequency();
    if current == 0 {
        return None;
    }
    let (min, max) = frequency_limits();
    Some(CpuFrequency {
        current: current as f64,
        min,
        max,
    })
}

#[cfg(target_os = "linux")]
fn frequency_limits() -> (Option<f64>, Option<f64>) {
    let read_khz = |file: &str| {
        crate::error::read_to_string(format!("/sys/devices/system/cpu/cpu0/cpufreq/{file}"))
            .ok()
            .and_then(|value| value.trim().parse::<f64>().ok())
            .map(|khz| khz / 1000.0)
    };
    (read_khz("cpuinfo_min_freq"), read_khz("cpuinfo_max_freq"))
}

#[cfg(not(target_os = "linux"))]
fn frequency_limits() -> (Option<f64>, Option<f64>) {
    (None, None)
}

#[cfg(not(windows))]
fn load_average() -> Option<LoadAverage> {
    let load = System::load_average();
    Some(LoadAverage {
        one: load.one,
        five: load.five,
        fifteen: load.fifteen,
    })
}

#[cfg(windows)]
fn load_average() -> Option<LoadAverage> {
    None
}
