mod connections;
mod interfaces;
mod monitor;

pub use connections::*;
pub use monitor::*;

use crate::metrics::rate::format_speed;
use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    /// Hardware (MAC) address.
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceAddress {
    pub family: AddressFamily,
    pub address: String,
    pub netmask: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    /// `None` where the platform does not report the state.
    pub is_up: Option<bool>,
    /// Link speed in Mbps, where the driver reports one.
    pub speed: Option<u64>,
    pub mtu: Option<u64>,
    pub addresses: Vec<InterfaceAddress>,
}

/// Cumulative counters, summed over interfaces or for one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NetIoCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    /// Dropped packets, where the platform reports them.
    pub dropin: Option<u64>,
    pub dropout: Option<u64>,
}

/// Throughput in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct NetworkSpeeds {
    pub upload: f64,
    pub download: f64,
}

impl NetworkSpeeds {
    pub fn upload_kbps(&self) -> f64 {
        self.upload / 1024.0
    }

    pub fn download_kbps(&self) -> f64 {
        self.download / 1024.0
    }

    pub fn upload_mbps(&self) -> f64 {
        self.upload / (1024.0 * 1024.0)
    }

    pub fn download_mbps(&self) -> f64 {
        self.download / (1024.0 * 1024.0)
    }

    pub fn upload_formatted(&self) -> String {
        format_speed(self.upload)
    }

    pub fn download_formatted(&self) -> String {
        format_speed(self.download)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub timestamp: DateTime<Local>,
    pub interfaces: Vec<NetworkInterface>,
    pub io_counters: NetIoCounters,
    /// Throughput since the previous live reading; zero on the first.
    pub speeds: NetworkSpeeds,
    pub connections_count: usize,
}

/// One recorder tick, in KB/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetworkSample {
    pub upload_kbps: f64,
    pub download_kbps: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkHistory {
    pub timestamps: Vec<DateTime<Local>>,
    pub upload_kbps: Vec<f64>,
    pub download_kbps: Vec<f64>,
}
