use super::{
    fragmentation, io, DiskFragmentation, DiskHistory, DiskIo, DiskIoSnapshot, DiskSample,
    DiskSnapshot, DiskUsage, PartitionInfo,
};
use crate::config::MonitorSettings;
use crate::error::{Error, Result};
use crate::metrics::history::HistoryBuffer;
use crate::metrics::rate::RateState;
use crate::metrics::recorder::{Recorder, Sampler};
use crate::metrics::{record_into, SharedHistory};
use chrono::Local;
use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::Disks;

/// Storage utilisation: partitions, I/O counters and throughput.
#[derive(Debug)]
pub struct DiskMonitor {
    settings: MonitorSettings,
    history: SharedHistory<DiskSample>,
    /// Baseline for throughput reported by [`DiskMonitor::get_current_stats`];
    /// the recorder keeps its own.
    live_rate: Mutex<RateState>,
    recorder: Recorder,
}

impl Default for DiskMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::new(3600, 5))
    }
}

impl DiskMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            history: Arc::new(Mutex::new(HistoryBuffer::new(settings.capacity()))),
            live_rate: Mutex::new(RateState::new()),
            recorder: Recorder::new("disk"),
        }
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    /// Reads partitions, I/O counters and the fragmentation probe. The
    /// throughput is measured against the previous call; the first call
    /// reports zero.
    pub fn get_current_stats(&self) -> DiskSnapshot {
        let partitions = get_partitions();
        let io_counters = self.get_io_counters();
        DiskSnapshot {
            timestamp: Local::now(),
            fragmentation: fragmentation::probe(&partitions),
            partitions,
            io_counters,
        }
    }

    pub fn get_io_counters(&self) -> Option<DiskIoSnapshot> {
        read_io(&mut self.live_rate.lock())
    }

    pub fn get_fragmentation(&self) -> DiskFragmentation {
        fragmentation::probe(&get_partitions())
    }

    pub fn get_history(&self) -> DiskHistory {
        let history = self.history.lock();
        DiskHistory {
            timestamps: history.timestamps(),
            disk_usage: history.series(|s| s.partitions.clone()),
            io_stats: history.series(|s| s.io),
        }
    }

    pub fn start_monitoring(&mut self) {
        let sampler = DiskSampler {
            rate: RateState::new(),
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

/// Lists mounted partitions. A mount whose size cannot be read is kept
/// with an error marker.
pub fn get_partitions() -> Vec<PartitionInfo> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .map(|disk| {
            let total = disk.total_space();
            let (usage, error) = if total == 0 {
                (None, Some("not accessible".to_string()))
            } else {
                (Some(DiskUsage::new(total, disk.available_space())), None)
            };
            PartitionInfo {
                device: disk.name().to_string_lossy().into_owned(),
                mountpoint: disk.mount_point().to_string_lossy().into_owned(),
                fstype: disk.file_system().to_string_lossy().into_owned(),
                removable: disk.is_removable(),
                usage,
                error,
            }
        })
        .collect()
}

/// Usage of the filesystem holding `path`.
pub fn get_disk_usage(path: impl AsRef<Path>) -> Result<DiskUsage> {
    let path = path.as_ref();
    let path = path
        .canonicalize()
        .map_err(|err| Error::read(path, err))?;

    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| DiskUsage::new(disk.total_space(), disk.available_space()))
        .ok_or_else(|| Error::NoFilesystem(path.clone()))
}

/// Cumulative counters per block device and partition; empty when unavailable.
pub fn get_per_disk_io() -> BTreeMap<String, DiskIo> {
    io::read_per_disk().unwrap_or_else(|err| {
        debug!("per-disk I/O counters unavailable: {err}");
        BTreeMap::new()
    })
}

fn read_io(rate: &mut RateState) -> Option<DiskIoSnapshot> {
    let counters = match io::read_total() {
        Ok(counters) => counters,
        Err(err) => {
            debug!("disk I/O counters unavailable: {err}");
            return None;
        }
    };
    let (read_speed, write_speed) =
        rate.observe(counters.read_bytes, counters.write_bytes, Instant::now());
    Some(DiskIoSnapshot {
        counters,
        read_speed,
        write_speed,
    })
}

struct DiskSampler {
    rate: RateState,
}

impl Sampler for DiskSampler {
    type Sample = DiskSample;

    fn prime(&mut self) {
        read_io(&mut self.rate);
    }

    fn sample(&mut self) -> Option<DiskSample> {
        let partitions = get_partitions();
        let io = read_io(&mut self.rate);
        debug!("disk tick: {} partitions", partitions.len());
        Some(DiskSample { partitions, io })
    }
}
