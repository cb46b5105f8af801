#![cfg_attr(not(target_os = "linux"), allow(dead_code))]

use super::{AddressFamily, InterfaceAddress, NetIoCounters, NetworkInterface};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use sysinfo::{NetworkData, Networks};

pub(super) fn list(networks: &Networks) -> Vec<NetworkInterface> {
    let up = up_flags();
    let mut interfaces: Vec<NetworkInterface> = networks
        .iter()
        .map(|(name, data)| NetworkInterface {
            is_up: up.get(name).copied(),
            speed: link_speed(name),
            mtu: mtu(name),
            name: name.clone(),
            addresses: addresses(data),
        })
        .collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}

fn addresses(data: &NetworkData) -> Vec<InterfaceAddress> {
    let mut addresses: Vec<InterfaceAddress> = data
        .ip_networks()
        .iter()
        .map(|network| InterfaceAddress {
            family: match network.addr {
                IpAddr::V4(_) => AddressFamily::Ipv4,
                IpAddr::V6(_) => AddressFamily::Ipv6,
            },
            address: network.addr.to_string(),
            netmask: Some(netmask(&network.addr, network.prefix).to_string()),
        })
        .collect();

    let mac = data.mac_address();
    if !mac.is_unspecified() {
        addresses.push(InterfaceAddress {
            family: AddressFamily::Link,
            address: mac.to_string(),
            netmask: None,
        });
    }
    addresses
}

/// Netmask for a prefix length of the same family as `addr`.
pub(super) fn netmask(addr: &IpAddr, prefix: u8) -> IpAddr {
    match addr {
        IpAddr::V4(_) => {
            let bits = u32::MAX.checked_shl(32 - u32::from(prefix.min(32))).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(bits))
        }
        IpAddr::V6(_) => {
            let bits = u128::MAX.checked_shl(128 - u32::from(prefix.min(128))).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(bits))
        }
    }
}

/// Administrative up state of every interface the OS reports.
#[cfg(unix)]
pub(super) fn up_flags() -> HashMap<String, bool> {
    pnet::datalink::interfaces()
        .into_iter()
        .map(|interface| {
            let up = interface.is_up();
            (interface.name, up)
        })
        .collect()
}

#[cfg(not(unix))]
pub(super) fn up_flags() -> HashMap<String, bool> {
    HashMap::new()
}

/// Totals over every interface.
pub(super) fn total_counters(networks: &Networks) -> NetIoCounters {
    let drops = read_drops().ok();
    let mut total = NetIoCounters::default();
    for (_, data) in networks.iter() {
        total.bytes_sent += data.total_transmitted();
        total.bytes_recv += data.total_received();
        total.packets_sent += data.total_packets_transmitted();
        total.packets_recv += data.total_packets_received();
        total.errin += data.total_errors_on_received();
        total.errout += data.total_errors_on_transmitted();
    }
    if let Some(drops) = drops {
        total.dropin = Some(drops.values().map(|d| d.0).sum());
        total.dropout = Some(drops.values().map(|d| d.1).sum());
    }
    total
}

pub(super) fn per_interface_counters(networks: &Networks) -> BTreeMap<String, NetIoCounters> {
    let drops = read_drops().unwrap_or_default();
    networks
        .iter()
        .map(|(name, data)| {
            let (dropin, dropout) = match drops.get(name) {
                Some((dropin, dropout)) => (Some(*dropin), Some(*dropout)),
                None => (None, None),
            };
            (
                name.clone(),
                NetIoCounters {
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    packets_sent: data.total_packets_transmitted(),
                    packets_recv: data.total_packets_received(),
                    errin: data.total_errors_on_received(),
                    errout: data.total_errors_on_transmitted(),
                    dropin,
                    dropout,
                },
            )
        })
        .collect()
}

/// `(rx_drop, tx_drop)` per interface from `/proc/net/dev`.
pub(super) fn parse_net_dev_drops(content: &str) -> Result<BTreeMap<String, (u64, u64)>> {
    content
        .lines()
        .skip(2)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (name, fields) = line
                .split_once(':')
                .ok_or_else(|| Error::parse("/proc/net/dev", line))?;
            let fields: Vec<u64> = fields
                .split_whitespace()
                .map(str::parse)
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| Error::parse("/proc/net/dev", line))?;
            if fields.len() < 12 {
                return Err(Error::parse("/proc/net/dev", line));
            }
            Ok((name.trim().to_string(), (fields[3], fields[11])))
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn read_drops() -> Result<BTreeMap<String, (u64, u64)>> {
    parse_net_dev_drops(&crate::error::read_to_string("/proc/net/dev")?)
}

#[cfg(not(target_os = "linux"))]
fn read_drops() -> Result<BTreeMap<String, (u64, u64)>> {
    Err(Error::Unsupported("interface drop counters"))
}

#[cfg(target_os = "linux")]
fn sys_class_net(name: &str, attribute: &str) -> Option<String> {
    crate::error::read_to_string(format!("/sys/class/net/{name}/{attribute}"))
        .ok()
        .map(|value| value.trim().to_string())
}

#[cfg(target_os = "linux")]
fn link_speed(name: &str) -> Option<u64> {
    sys_class_net(name, "speed")?
        .parse::<u64>()
        .ok()
        .filter(|speed| *speed > 0)
}

#[cfg(target_os = "linux")]
fn mtu(name: &str) -> Option<u64> {
    sys_class_net(name, "mtu")?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn link_speed(_name: &str) -> Option<u64> {
    None
}

#[cfg(not(target_os = "linux"))]
fn mtu(_name: &str) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_netmasks() {
        let addr: IpAddr = "192.168.1.10".parse().unwrap();
        assert_eq!(netmask(&addr, 24).to_string(), "255.255.255.0");
        assert_eq!(netmask(&addr, 32).to_string(), "255.255.255.255");
        assert_eq!(netmask(&addr, 0).to_string(), "0.0.0.0");
        assert_eq!(netmask(&addr, 20).to_string(), "255.255.240.0");
    }

    #[test]
    fn ipv6_netmasks() {
        let addr: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(netmask(&addr, 64).to_string(), "ffff:ffff:ffff:ffff::");
        assert_eq!(netmask(&addr, 0).to_string(), "::");
    }

    #[test]
    fn drops_from_net_dev() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 8000 100 0 0 0 0 0 0 8000 100 0 0 0 0 0 0
  eth0: 123456 900 1 7 0 0 0 3 65432 800 0 2 0 0 0 0
";
        let drops = parse_net_dev_drops(content).unwrap();
        assert_eq!(drops["lo"], (0, 0));
        assert_eq!(drops["eth0"], (7, 2));
    }

    #[cfg(unix)]
    #[test]
    fn up_state_comes_from_the_os() {
        let networks = Networks::new_with_refreshed_list();
        let up = up_flags();
        for interface in list(&networks) {
            assert_eq!(interface.is_up, up.get(&interface.name).copied());
        }
        #[cfg(target_os = "linux")]
        assert_eq!(up.get("lo"), Some(&true));
    }

    #[test]
    fn malformed_net_dev() {
        let content = "header\nheader\n  eth0: 1 2 3\n";
        assert!(parse_net_dev_drops(content).is_err());
    }
}
