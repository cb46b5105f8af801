use super::{
    connections, interfaces, Connection, ConnectionKind, NetIoCounters, NetworkHistory,
    NetworkInterface, NetworkSample, NetworkSnapshot, NetworkSpeeds,
};
use crate::config::MonitorSettings;
use crate::metrics::history::HistoryBuffer;
use crate::metrics::rate::RateState;
use crate::metrics::recorder::{Recorder, Sampler};
use crate::metrics::{record_into, SharedHistory};
use chrono::Local;
use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::Networks;

/// Interfaces, traffic counters, throughput and open sockets.
#[derive(Debug)]
pub struct NetworkMonitor {
    settings: MonitorSettings,
    history: SharedHistory<NetworkSample>,
    /// Baseline for [`NetworkMonitor::get_current_speeds`]; the recorder
    /// keeps its own.
    live_rate: Mutex<RateState>,
    recorder: Recorder,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::new(3600, 1))
    }
}

impl NetworkMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            history: Arc::new(Mutex::new(HistoryBuffer::new(settings.capacity()))),
            live_rate: Mutex::new(RateState::new()),
            recorder: Recorder::new("network"),
        }
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    /// Reads interfaces and counters, and refreshes the live throughput
    /// baseline. Connection enumeration walks every process's descriptors,
    /// so only the count is included here.
    pub fn get_current_stats(&self) -> NetworkSnapshot {
        let networks = Networks::new_with_refreshed_list();
        let io_counters = interfaces::total_counters(&networks);
        NetworkSnapshot {
            timestamp: Local::now(),
            interfaces: interfaces::list(&networks),
            speeds: self.observe(&io_counters),
            io_counters,
            connections_count: connections::get_connections(ConnectionKind::Inet, None).len(),
        }
    }

    pub fn get_io_counters(&self) -> NetIoCounters {
        interfaces::total_counters(&Networks::new_with_refreshed_list())
    }

    pub fn get_per_interface_counters(&self) -> BTreeMap<String, NetIoCounters> {
        interfaces::per_interface_counters(&Networks::new_with_refreshed_list())
    }

    pub fn get_interfaces(&self) -> Vec<NetworkInterface> {
        interfaces::list(&Networks::new_with_refreshed_list())
    }

    /// Throughput since the previous live reading. The first call reports zero.
    pub fn get_current_speeds(&self) -> NetworkSpeeds {
        self.observe(&self.get_io_counters())
    }

    /// Open sockets of `kind`, capped at `limit` rows.
    pub fn get_connections(&self, kind: ConnectionKind, limit: Option<usize>) -> Vec<Connection> {
        connections::get_connections(kind, limit)
    }

    pub fn get_history(&self) -> NetworkHistory {
        let history = self.history.lock();
        NetworkHistory {
            timestamps: history.timestamps(),
            upload_kbps: history.series(|s| s.upload_kbps),
            download_kbps: history.series(|s| s.download_kbps),
        }
    }

    pub fn start_monitoring(&mut self) {
        let sampler = NetworkSampler {
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

    fn observe(&self, counters: &NetIoCounters) -> NetworkSpeeds {
        speeds(&mut self.live_rate.lock(), counters, Instant::now())
    }
}

fn speeds(rate: &mut RateState, counters: &NetIoCounters, at: Instant) -> NetworkSpeeds {
    let (upload, download) = rate.observe(counters.bytes_sent, counters.bytes_recv, at);
    NetworkSpeeds { upload, download }
}

struct NetworkSampler {
    rate: RateState,
}

impl NetworkSampler {
    fn read(&mut self) -> NetworkSpeeds {
        // Interfaces come and go; a fresh list per tick picks them up.
        let counters = interfaces::total_counters(&Networks::new_with_refreshed_list());
        speeds(&mut self.rate, &counters, Instant::now())
    }
}

impl Sampler for NetworkSampler {
    type Sample = NetworkSample;

    fn prime(&mut self) {
        self.read();
    }

    fn sample(&mut self) -> Option<NetworkSample> {
        let speeds = self.read();
        debug!(
            "network tick: up {} down {}",
            speeds.upload_formatted(),
            speeds.download_formatted()
        );
        Some(NetworkSample {
            upload_kbps: speeds.upload_kbps(),
            download_kbps: speeds.download_kbps(),
        })
    }
}
