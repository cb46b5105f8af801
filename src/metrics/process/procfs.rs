//! Per-process details sysinfo does not expose.

#![cfg_attr(not(target_os = "linux"), allow(dead_code, unused_imports))]

use super::{ProcessCpuTimes, ThreadInfo};
use crate::metrics::cpu::clock_ticks;

/// Whether `/proc/<pid>` can be inspected by this user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Readable,
    Denied,
    Missing,
}

/// `utime` and `stime` from a `stat` line. The command name may contain
/// spaces and parentheses, so fields are counted after the last `)`.
pub(super) fn parse_stat_times(content: &str, hz: f64) -> Option<ProcessCpuTimes> {
    let (_, rest) = content.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // rest starts at field 3 (state); utime and stime are fields 14 and 15.
    let user = fields.get(11)?.parse::<u64>().ok()?;
    let system = fields.get(12)?.parse::<u64>().ok()?;
    Some(ProcessCpuTimes {
        user: user as f64 / hz,
        system: system as f64 / hz,
    })
}

#[cfg(target_os = "linux")]
mod imp {
    use super::*;
    use std::fs;
    use std::io::ErrorKind;

    pub(crate) fn access(pid: u32) -> Access {
        match fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(_) => Access::Readable,
            Err(err) if err.kind() == ErrorKind::PermissionDenied => Access::Denied,
            Err(_) => Access::Missing,
        }
    }

    pub(crate) fn cpu_times(pid: u32) -> Option<ProcessCpuTimes> {
        let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        parse_stat_times(&stat, clock_ticks())
    }

    pub(crate) fn threads(pid: u32) -> Vec<ThreadInfo> {
        let Ok(entries) = fs::read_dir(format!("/proc/{pid}/task")) else {
            return Vec::new();
        };
        let mut threads: Vec<ThreadInfo> = entries
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<u32>().ok())
            .filter_map(|tid| {
                let stat = fs::read_to_string(format!("/proc/{pid}/task/{tid}/stat")).ok()?;
                let times = parse_stat_times(&stat, clock_ticks())?;
                Some(ThreadInfo {
                    id: tid,
                    user_time: times.user,
                    system_time: times.system,
                })
            })
            .collect();
        threads.sort_by_key(|thread| thread.id);
        threads
    }

    /// Regular files among the open descriptors.
    pub(crate) fn open_files(pid: u32) -> Vec<String> {
        let Ok(entries) = fs::read_dir(format!("/proc/{pid}/fd")) else {
            return Vec::new();
        };
        let mut files: Vec<String> = entries
            .filter_map(|entry| fs::read_link(entry.ok()?.path()).ok())
            .filter(|target| target.is_absolute() && target.is_file())
            .map(|target| target.to_string_lossy().into_owned())
            .collect();
        files.sort();
        files.dedup();
        files
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::*;

    pub(crate) fn access(_pid: u32) -> Access {
        Access::Readable
    }

    pub(crate) fn cpu_times(_pid: u32) -> Option<ProcessCpuTimes> {
        None
    }

    pub(crate) fn threads(_pid: u32) -> Vec<ThreadInfo> {
        Vec::new()
    }

    pub(crate) fn open_files(_pid: u32) -> Vec<String> {
        Vec::new()
    }
}

pub(super) use imp::*;
