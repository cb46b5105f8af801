pub mod cpu;
pub mod disk;
pub mod history;
pub mod memory;
pub mod network;
pub mod process;
pub mod rate;
pub mod recorder;

use crate::config::Settings;
use cpu::CpuMonitor;
use disk::DiskMonitor;
use history::HistoryBuffer;
use log::info;
use memory::MemoryMonitor;
use network::NetworkMonitor;
use parking_lot::Mutex;
use process::ProcessMonitor;
use std::sync::Arc;

/// History shared between a monitor and its recorder thread.
pub type SharedHistory<T> = Arc<Mutex<HistoryBuffer<T>>>;

/// A recorder callback that appends each sample to `history`.
pub(crate) fn record_into<T: Send + 'static>(
    history: &SharedHistory<T>,
) -> impl FnMut(T) + Send + 'static {
    let history = Arc::clone(history);
    move |sample| history.lock().push(sample)
}

/// The five resource monitors, each with its own history and recorder.
#[derive(Debug)]
pub struct Metrics {
    pub cpu: CpuMonitor,
    pub memory: MemoryMonitor,
    pub disk: DiskMonitor,
    pub network: NetworkMonitor,
    pub process: ProcessMonitor,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl Metrics {
    pub fn new(settings: &Settings) -> Self {
        Self {
            cpu: CpuMonitor::new(settings.cpu),
            memory: MemoryMonitor::new(settings.memory),
            disk: DiskMonitor::new(settings.disk),
            network: NetworkMonitor::new(settings.network),
            process: ProcessMonitor::new(settings.process),
        }
    }

    pub fn start_all(&mut self) {
        self.cpu.start_monitoring();
        self.memory.start_monitoring();
        self.disk.start_monitoring();
        self.network.start_monitoring();
        self.process.start_monitoring();
        info!("all monitors started");
    }

    pub fn stop_all(&mut self) {
        self.cpu.stop_monitoring();
        self.memory.stop_monitoring();
        self.disk.stop_monitoring();
        self.network.stop_monitoring();
        self.process.stop_monitoring();
        info!("all monitors stopped");
    }

    pub fn is_monitoring(&self) -> bool {
        self.cpu.is_monitoring()
            || self.memory.is_monitoring()
            || self.disk.is_monitoring()
            || self.network.is_monitoring()
            || self.process.is_monitoring()
    }
}
