use super::{
    fragmentation, percent, MemoryFragmentation, MemoryHistory, MemorySample, MemorySnapshot,
    SwapMemory, VirtualMemory,
};
use crate::config::MonitorSettings;
use crate::metrics::history::HistoryBuffer;
use crate::metrics::recorder::{Recorder, Sampler};
use crate::metrics::{record_into, SharedHistory};
use chrono::Local;
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::System;

/// RAM and swap utilisation with a fragmentation estimate.
#[derive(Debug)]
pub struct MemoryMonitor {
    settings: MonitorSettings,
    history: SharedHistory<MemorySample>,
    recorder: Recorder,
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::new(3600, 1))
    }
}

impl MemoryMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            history: Arc::new(Mutex::new(HistoryBuffer::new(settings.capacity()))),
            recorder: Recorder::new("memory"),
        }
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    pub fn get_current_stats(&self) -> MemorySnapshot {
        let mut system = System::new();
        system.refresh_memory();
        let memory = virtual_memory(&system);

        MemorySnapshot {
            timestamp: Local::now(),
            swap: swap_memory(&system),
            fragmentation: get_memory_fragmentation(&memory),
            memory,
        }
    }

    pub fn get_history(&self) -> MemoryHistory {
        let history = self.history.lock();
        MemoryHistory {
            timestamps: history.timestamps(),
            memory_percent: history.series(|s| s.memory_percent),
            memory_used_gb: history.series(|s| s.memory_used_gb),
            swap_percent: history.series(|s| s.swap_percent),
        }
    }

    pub fn start_monitoring(&mut self) {
        let sampler = MemorySampler {
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

/// Kernel statistics when the platform exposes them, otherwise the
/// free-versus-available approximation.
pub fn get_memory_fragmentation(memory: &VirtualMemory) -> MemoryFragmentation {
    match fragmentation::probe() {
        Ok(fragmentation) => fragmentation,
        Err(err) => {
            debug!("falling back to free/available fragmentation estimate: {err}");
            MemoryFragmentation::from_free_available(memory.free, memory.available)
        }
    }
}

struct MemorySampler {
    system: System,
}

impl Sampler for MemorySampler {
    type Sample = MemorySample;

    fn sample(&mut self) -> Option<MemorySample> {
        self.system.refresh_memory();
        let memory = virtual_memory(&self.system);
        if memory.total == 0 {
            warn!("memory total reported as zero, skipping tick");
            return None;
        }

        let swap_percent = percent(self.system.used_swap(), self.system.total_swap());
        Some(MemorySample {
            memory_percent: memory.percent,
            memory_used_gb: memory.used_gb(),
            swap_percent,
        })
    }
}

fn virtual_memory(system: &System) -> VirtualMemory {
    let total = system.total_memory();
    let available = system.available_memory();
    VirtualMemory {
        total,
        available,
        used: system.used_memory(),
        free: system.free_memory(),
        percent: percent(total.saturating_sub(available), total),
    }
}

fn swap_memory(system: &System) -> SwapMemory {
    let total = system.total_swap();
    let used = system.used_swap();
    let (sin, sout) = match swap_io() {
        Ok((sin, sout)) => (Some(sin), Some(sout)),
        Err(err) => {
            debug!("swap in/out counters unavailable: {err}");
            (None, None)
        }
    };
    SwapMemory {
        total,
        used,
        free: system.free_swap(),
        percent: percent(used, total),
        sin,
        sout,
    }
}

/// Page size assumed for `/proc/vmstat` swap counters.
#[cfg(target_os = "linux")]
const PAGE_SIZE: u64 = 4096;

#[cfg(target_os = "linux")]
fn swap_io() -> crate::Result<(u64, u64)> {
    let content = crate::error::read_to_string("/proc/vmstat")?;
    parse_swap_io(&content).map(|(pages_in, pages_out)| (pages_in * PAGE_SIZE, pages_out * PAGE_SIZE))
}

#[cfg(not(target_os = "linux"))]
fn swap_io() -> crate::Result<(u64, u64)> {
    Err(crate::Error::Unsupported("swap in/out counters"))
}

/// Extracts `(pswpin, pswpout)` page counts from `/proc/vmstat`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_swap_io(content: &str) -> crate::Result<(u64, u64)> {
    let mut pages_in = None;
    let mut pages_out = None;
    for line in content.lines() {
        match line.split_once(' ') {
            Some(("pswpin", value)) => pages_in = value.trim().parse().ok(),
            Some(("pswpout", value)) => pages_out = value.trim().parse().ok(),
            _ => {}
        }
    }
    pages_in
        .zip(pages_out)
        .ok_or_else(|| crate::Error::parse("/proc/vmstat", "missing pswpin/pswpout"))
}
