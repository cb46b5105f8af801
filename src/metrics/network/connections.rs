#![cfg_attr(not(target_os = "linux"), allow(dead_code, unused_imports))]

use super::AddressFamily;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Which sockets to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionKind {
    /// TCP and UDP over IPv4 and IPv6.
    #[default]
    Inet,
    Inet4,
    Inet6,
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
}

impl ConnectionKind {
    /// The socket tables covered by this kind.
    pub fn tables(&self) -> &'static [(Protocol, AddressFamily)] {
        use AddressFamily::{Ipv4, Ipv6};
        use Protocol::{Tcp, Udp};
        match self {
            ConnectionKind::Inet => &[(Tcp, Ipv4), (Tcp, Ipv6), (Udp, Ipv4), (Udp, Ipv6)],
            ConnectionKind::Inet4 => &[(Tcp, Ipv4), (Udp, Ipv4)],
            ConnectionKind::Inet6 => &[(Tcp, Ipv6), (Udp, Ipv6)],
            ConnectionKind::Tcp => &[(Tcp, Ipv4), (Tcp, Ipv6)],
            ConnectionKind::Tcp4 => &[(Tcp, Ipv4)],
            ConnectionKind::Tcp6 => &[(Tcp, Ipv6)],
            ConnectionKind::Udp => &[(Udp, Ipv4), (Udp, Ipv6)],
            ConnectionKind::Udp4 => &[(Udp, Ipv4)],
            ConnectionKind::Udp6 => &[(Udp, Ipv6)],
        }
    }
}

impl FromStr for ConnectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "inet" | "all" => ConnectionKind::Inet,
            "inet4" => ConnectionKind::Inet4,
            "inet6" => ConnectionKind::Inet6,
            "tcp" => ConnectionKind::Tcp,
            "tcp4" => ConnectionKind::Tcp4,
            "tcp6" => ConnectionKind::Tcp6,
            "udp" => ConnectionKind::Udp,
            "udp4" => ConnectionKind::Udp4,
            "udp6" => ConnectionKind::Udp6,
            other => return Err(Error::Config(format!("unknown connection kind {other:?}"))),
        })
    }
}

/// An open socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub protocol: Protocol,
    pub family: AddressFamily,
    pub local: Option<SocketAddr>,
    /// Absent for listening and unconnected sockets.
    pub remote: Option<SocketAddr>,
    /// TCP state such as `ESTABLISHED`; `NONE` for UDP.
    pub status: String,
    pub pid: Option<u32>,
    pub process_name: Option<String>,
    #[serde(skip)]
    pub inode: u64,
}

fn tcp_state(code: u8) -> &'static str {
    match code {
        0x01 => "ESTABLISHED",
        0x02 => "SYN_SENT",
        0x03 => "SYN_RECV",
        0x04 => "FIN_WAIT1",
        0x05 => "FIN_WAIT2",
        0x06 => "TIME_WAIT",
        0x07 => "CLOSE",
        0x08 => "CLOSE_WAIT",
        0x09 => "LAST_ACK",
        0x0A => "LISTEN",
        0x0B => "CLOSING",
        0x0C => "NEW_SYN_RECV",
        _ => "UNKNOWN",
    }
}

/// Decodes a kernel `ADDR:PORT` pair; addresses are in host byte order
/// per 32-bit word, ports in big-endian hex.
fn parse_endpoint(field: &str, family: AddressFamily) -> Option<SocketAddr> {
    let (addr, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;
    let ip = match family {
        AddressFamily::Ipv4 => {
            let word = u32::from_str_radix(addr, 16).ok()?;
            IpAddr::V4(Ipv4Addr::from(word.to_ne_bytes()))
        }
        AddressFamily::Ipv6 => {
            if addr.len() != 32 {
                return None;
            }
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_mut(4).enumerate() {
                let word = u32::from_str_radix(&addr[i * 8..i * 8 + 8], 16).ok()?;
                chunk.copy_from_slice(&word.to_ne_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        AddressFamily::Link => return None,
    };
    Some(SocketAddr::new(ip, port))
}

/// Parses one `/proc/net/{tcp,tcp6,udp,udp6}` table.
pub fn parse_socket_table(
    content: &str,
    protocol: Protocol,
    family: AddressFamily,
) -> Vec<Connection> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let local = parse_endpoint(fields[1], family)?;
            let remote = parse_endpoint(fields[2], family)
                .filter(|remote| !remote.ip().is_unspecified() || remote.port() != 0);
            let status = match protocol {
                Protocol::Tcp => tcp_state(u8::from_str_radix(fields[3], 16).ok()?),
                Protocol::Udp => "NONE",
            };
            Some(Connection {
                protocol,
                family,
                local: Some(local),
                remote,
                status: status.to_string(),
                pid: None,
                process_name: None,
                inode: fields[9].parse().ok()?,
            })
        })
        .collect()
}

/// Extracts the inode from a `/proc/<pid>/fd` link target such as `socket:[1234]`.
pub fn socket_inode(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

#[cfg(target_os = "linux")]
mod procfs {
    use super::*;
    use std::fs;

    fn table_path(protocol: Protocol, family: AddressFamily) -> &'static str {
        match (protocol, family) {
            (Protocol::Tcp, AddressFamily::Ipv6) => "/proc/net/tcp6",
            (Protocol::Udp, AddressFamily::Ipv4) => "/proc/net/udp",
            (Protocol::Udp, AddressFamily::Ipv6) => "/proc/net/udp6",
            _ => "/proc/net/tcp",
        }
    }

    pub(super) fn sockets(kind: ConnectionKind) -> Vec<Connection> {
        kind.tables()
            .iter()
            .flat_map(|&(protocol, family)| {
                match crate::error::read_to_string(table_path(protocol, family)) {
                    Ok(content) => parse_socket_table(&content, protocol, family),
                    Err(err) => {
                        log::debug!("socket table unavailable: {err}");
                        Vec::new()
                    }
                }
            })
            .collect()
    }

    /// Socket inodes held open by `pid`. Unreadable descriptors are skipped.
    pub(super) fn inodes_of(pid: u32) -> HashSet<u64> {
        let Ok(entries) = fs::read_dir(format!("/proc/{pid}/fd")) else {
            return HashSet::new();
        };
        entries
            .filter_map(|entry| fs::read_link(entry.ok()?.path()).ok())
            .filter_map(|target| socket_inode(&target.to_string_lossy()))
            .collect()
    }

    /// Maps socket inode to owning pid over every readable process.
    pub(super) fn inode_owners() -> HashMap<u64, u32> {
        let Ok(entries) = fs::read_dir("/proc") else {
            return HashMap::new();
        };
        let mut owners = HashMap::new();
        for pid in entries.filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<u32>().ok())
        {
            for inode in inodes_of(pid) {
                owners.entry(inode).or_insert(pid);
            }
        }
        owners
    }

    pub(super) fn process_name(pid: u32) -> Option<String> {
        fs::read_to_string(format!("/proc/{pid}/comm"))
            .ok()
            .map(|name| name.trim().to_string())
    }
}

/// Enumerates open sockets with their owning process, where visible.
/// At most `limit` entries are returned.
#[cfg(target_os = "linux")]
pub fn get_connections(kind: ConnectionKind, limit: Option<usize>) -> Vec<Connection> {
    let owners = procfs::inode_owners();
    let mut names: HashMap<u32, Option<String>> = HashMap::new();
    procfs::sockets(kind)
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|mut connection| {
            if let Some(&pid) = owners.get(&connection.inode) {
                connection.pid = Some(pid);
                connection.process_name = names
                    .entry(pid)
                    .or_insert_with(|| procfs::process_name(pid))
                    .clone()
                    .or_else(|| Some("Unknown".to_string()));
            }
            connection
        })
        .collect()
}

/// Sockets owned by one process; empty when its descriptors are unreadable.
#[cfg(target_os = "linux")]
pub fn connections_of(pid: u32) -> Vec<Connection> {
    let inodes = procfs::inodes_of(pid);
    if inodes.is_empty() {
        return Vec::new();
    }
    let name = procfs::process_name(pid);
    procfs::sockets(ConnectionKind::Inet)
        .into_iter()
        .filter(|connection| inodes.contains(&connection.inode))
        .map(|mut connection| {
            connection.pid = Some(pid);
            connection.process_name = name.clone();
            connection
        })
        .collect()
}

/// Socket enumeration needs procfs; other platforms report none.
#[cfg(not(target_os = "linux"))]
pub fn get_connections(_kind: ConnectionKind, _limit: Option<usize>) -> Vec<Connection> {
    Vec::new()
}

#[cfg(not(target_os = "linux"))]
pub fn connections_of(_pid: u32) -> Vec<Connection> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One address word the way the kernel prints it on this host.
    fn word(octets: [u8; 4]) -> String {
        format!("{:08X}", u32::from_ne_bytes(octets))
    }

    fn tcp() -> String {
        format!(
            "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
   0: {}:0277 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 21456 1 0000000000000000 100 0 0 10 0\n\
   1: {}:A2C4 {}:01BB 01 00000000:00000000 02:000A7B1E 00000000  1000        0 98765 2 0000000000000000 20 4 30 10 -1\n",
            word([127, 0, 0, 1]),
            word([10, 0, 2, 15]),
            word([142, 187, 43, 93]),
        )
    }

    fn tcp6() -> String {
        let loopback = format!("{0}{0}{0}{1}", word([0, 0, 0, 0]), word([0, 0, 0, 1]));
        format!(
            "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
   0: {loopback}:1F90 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 3333 1 0000000000000000 100 0 0 10 0\n"
        )
    }

    #[test]
    fn parses_ipv4_table() {
        let connections = parse_socket_table(&tcp(), Protocol::Tcp, AddressFamily::Ipv4);
        assert_eq!(connections.len(), 2);

        let listen = &connections[0];
        assert_eq!(listen.local, Some("127.0.0.1:631".parse().unwrap()));
        assert_eq!(listen.remote, None);
        assert_eq!(listen.status, "LISTEN");
        assert_eq!(listen.inode, 21456);

        let established = &connections[1];
        assert_eq!(established.local, Some("10.0.2.15:41668".parse().unwrap()));
        assert_eq!(established.remote, Some("142.187.43.93:443".parse().unwrap()));
        assert_eq!(established.status, "ESTABLISHED");
    }

    #[test]
    fn parses_ipv6_table() {
        let connections = parse_socket_table(&tcp6(), Protocol::Tcp, AddressFamily::Ipv6);
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].local, Some("[::1]:8080".parse().unwrap()));
        assert_eq!(connections[0].family, AddressFamily::Ipv6);
    }

    #[test]
    fn udp_has_no_state() {
        let udp = "header\n   0: 00000000:0044 00000000:0000 07 00000000:00000000 00:00000000 00000000 0 0 555 2\n";
        let connections = parse_socket_table(udp, Protocol::Udp, AddressFamily::Ipv4);
        assert_eq!(connections[0].status, "NONE");
        assert_eq!(connections[0].local, Some("0.0.0.0:68".parse().unwrap()));
    }

    #[test]
    fn socket_link_targets() {
        assert_eq!(socket_inode("socket:[12345]"), Some(12345));
        assert_eq!(socket_inode("pipe:[12345]"), None);
        assert_eq!(socket_inode("/dev/null"), None);
    }

    #[test]
    fn kinds_from_str() {
        assert_eq!("all".parse::<ConnectionKind>().unwrap(), ConnectionKind::Inet);
        assert_eq!("tcp6".parse::<ConnectionKind>().unwrap().tables().len(), 1);
        assert!("unix".parse::<ConnectionKind>().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn own_listener_is_decoded() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let local = listener.local_addr().unwrap();
        let table = std::fs::read_to_string("/proc/net/tcp").unwrap();
        let connections = parse_socket_table(&table, Protocol::Tcp, AddressFamily::Ipv4);
        assert!(connections
            .iter()
            .any(|c| c.local == Some(local) && c.status == "LISTEN"));
    }

    #[test]
    fn limit_is_honoured() {
        assert!(get_connections(ConnectionKind::Inet, Some(3)).len() <= 3);
    }
}
