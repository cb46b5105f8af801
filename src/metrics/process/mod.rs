mod monitor;
mod procfs;

pub use monitor::*;

use crate::error::Error;
use crate::metrics::network::Connection;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Command lines in [`ProcessSummary`] are cut to this many characters.
pub const CMDLINE_DISPLAY_LEN: usize = 100;

/// At most this many environment variables are reported per process.
pub const ENVIRON_LIMIT: usize = 20;

/// Field a process list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    CpuPercent,
    #[default]
    MemoryPercent,
    Pid,
    MemoryMb,
    DiskTotalMb,
    /// Case-insensitive.
    Name,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu_percent" => Ok(SortKey::CpuPercent),
            "memory_percent" => Ok(SortKey::MemoryPercent),
            "pid" => Ok(SortKey::Pid),
            "memory_mb" => Ok(SortKey::MemoryMb),
            "disk_total_mb" => Ok(SortKey::DiskTotalMb),
            "name" => Ok(SortKey::Name),
            other => Err(Error::UnknownSortKey(other.to_string())),
        }
    }
}

/// Resource a "top processes" query ranks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopBy {
    #[default]
    Memory,
    Cpu,
    Disk,
}

impl TopBy {
    pub fn sort_key(&self) -> SortKey {
        match self {
            TopBy::Memory => SortKey::MemoryPercent,
            TopBy::Cpu => SortKey::CpuPercent,
            TopBy::Disk => SortKey::DiskTotalMb,
        }
    }
}

impl FromStr for TopBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(TopBy::Memory),
            "cpu" => Ok(TopBy::Cpu),
            "disk" => Ok(TopBy::Disk),
            other => Err(Error::UnknownSortKey(other.to_string())),
        }
    }
}

/// One row of the process list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub pid: u32,
    pub name: String,
    pub status: String,
    /// Relative to one core, so a busy multithreaded process can exceed 100.
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_mb: f64,
    pub memory_rss: u64,
    pub memory_vms: u64,
    pub username: Option<String>,
    pub start_time: Option<DateTime<Local>>,
    pub runtime_secs: u64,
    pub num_threads: usize,
    pub disk_read_mb: f64,
    pub disk_write_mb: f64,
    pub disk_total_mb: f64,
    /// Joined with spaces and cut to [`CMDLINE_DISPLAY_LEN`] characters.
    pub cmdline: String,
}

impl ProcessSummary {
    /// Runtime the way `H:MM:SS` clocks show it, prefixed with days when needed.
    pub fn runtime(&self) -> String {
        format_runtime(self.runtime_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ProcessCpuTimes {
    pub user: f64,
    pub system: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadInfo {
    pub id: u32,
    pub user_time: f64,
    pub system_time: f64,
}

/// Full inspection of one process. Sections the caller may not read are
/// left empty or zero.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessDetail {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub name: String,
    pub status: String,
    pub username: Option<String>,
    pub start_time: Option<DateTime<Local>>,
    pub runtime_secs: u64,
    pub cpu_percent: f32,
    pub cpu_times: Option<ProcessCpuTimes>,
    pub memory_rss: u64,
    pub memory_vms: u64,
    pub memory_percent: f32,
    pub memory_mb: f64,
    pub io_read_bytes: u64,
    pub io_write_bytes: u64,
    pub num_threads: usize,
    pub threads: Vec<ThreadInfo>,
    pub open_files: Vec<String>,
    pub connections: Vec<Connection>,
    pub cmdline: Vec<String>,
    pub exe: Option<String>,
    pub cwd: Option<String>,
    /// The first [`ENVIRON_LIMIT`] variables, in the order the process holds them.
    pub environ: Vec<(String, String)>,
}

impl ProcessDetail {
    pub fn io_read_mb(&self) -> f64 {
        self.io_read_bytes as f64 / MB
    }

    pub fn io_write_mb(&self) -> f64 {
        self.io_write_bytes as f64 / MB
    }
}

/// Outcome of a detail lookup for a process that exists.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProcessLookup {
    Found(Box<ProcessDetail>),
    AccessDenied { pid: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KillStatus {
    /// Signal delivered and the process is gone.
    Exited,
    /// Signal delivered; the process was still alive when the wait ended.
    SignalSent,
    NotFound,
    PermissionDenied,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KillResult {
    pub success: bool,
    pub status: KillStatus,
    pub message: String,
    pub pid: u32,
    pub name: Option<String>,
    pub warning: Option<String>,
}

impl KillResult {
    pub(crate) fn failure(pid: u32, status: KillStatus, message: String) -> Self {
        Self {
            success: false,
            status,
            message,
            pid,
            name: None,
            warning: None,
        }
    }

    pub(crate) fn not_found(pid: u32) -> Self {
        Self::failure(
            pid,
            KillStatus::NotFound,
            format!("process with PID {pid} not found"),
        )
    }
}

/// Aggregate view over the process list.
///
/// The totals are plain sums of the per-process percentages: CPU is not
/// divided by the core count and neither is capped at 100.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSystemSummary {
    pub total_processes: usize,
    pub status_breakdown: BTreeMap<String, usize>,
    pub total_memory_percent: f64,
    pub total_cpu_percent: f64,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessHistory {
    pub timestamps: Vec<DateTime<Local>>,
    pub counts: Vec<usize>,
}

pub(crate) const MB: f64 = 1024.0 * 1024.0;

/// Orders `processes` in place. Ties keep their enumeration order.
pub fn sort_processes(processes: &mut [ProcessSummary], key: SortKey, descending: bool) {
    processes.sort_by(|a, b| {
        let ordering = compare(a, b, key);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn compare(a: &ProcessSummary, b: &ProcessSummary, key: SortKey) -> Ordering {
    match key {
        SortKey::CpuPercent => a.cpu_percent.total_cmp(&b.cpu_percent),
        SortKey::MemoryPercent => a.memory_percent.total_cmp(&b.memory_percent),
        SortKey::Pid => a.pid.cmp(&b.pid),
        SortKey::MemoryMb => a.memory_mb.total_cmp(&b.memory_mb),
        SortKey::DiskTotalMb => a.disk_total_mb.total_cmp(&b.disk_total_mb),
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    }
}

/// Counts by status and raw percentage sums over `processes`.
pub fn summarize(processes: &[ProcessSummary]) -> ProcessSystemSummary {
    let mut status_breakdown = BTreeMap::new();
    for process in processes {
        *status_breakdown.entry(process.status.clone()).or_insert(0) += 1;
    }
    ProcessSystemSummary {
        total_processes: processes.len(),
        status_breakdown,
        total_memory_percent: processes.iter().map(|p| f64::from(p.memory_percent)).sum(),
        total_cpu_percent: processes.iter().map(|p| f64::from(p.cpu_percent)).sum(),
        timestamp: Local::now(),
    }
}

/// Case-insensitive match on name, pid or command line.
pub fn matches_query(process: &ProcessSummary, query: &str) -> bool {
    let query = query.to_lowercase();
    process.name.to_lowercase().contains(&query)
        || process.pid.to_string().contains(&query)
        || process.cmdline.to_lowercase().contains(&query)
}

pub(crate) fn truncate_cmdline(cmdline: String) -> String {
    match cmdline.char_indices().nth(CMDLINE_DISPLAY_LEN) {
        Some((cut, _)) => format!("{}...", &cmdline[..cut]),
        None => cmdline,
    }
}

pub fn format_runtime(secs: u64) -> String {
    let days = secs / 86_400;
    let clock = format!(
        "{}:{:02}:{:02}",
        secs % 86_400 / 3600,
        secs % 3600 / 60,
        secs % 60
    );
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        _ => format!("{days} days, {clock}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(pid: u32, name: &str, cpu: f32) -> ProcessSummary {
        ProcessSummary {
            pid,
            name: name.to_string(),
            status: "sleeping".to_string(),
            cpu_percent: cpu,
            memory_percent: cpu / 10.0,
            memory_mb: 0.0,
            memory_rss: 0,
            memory_vms: 0,
            username: None,
            start_time: None,
            runtime_secs: 0,
            num_threads: 1,
            disk_read_mb: 0.0,
            disk_write_mb: 0.0,
            disk_total_mb: 0.0,
            cmdline: String::new(),
        }
    }

    fn cpus(processes: &[ProcessSummary]) -> Vec<f32> {
        processes.iter().map(|p| p.cpu_percent).collect()
    }

    #[test]
    fn sorts_by_cpu_descending() {
        let mut processes = vec![process(1, "a", 5.0), process(2, "b", 50.0), process(3, "c", 10.0)];
        sort_processes(&mut processes, SortKey::CpuPercent, true);
        assert_eq!(cpus(&processes), vec![50.0, 10.0, 5.0]);

        sort_processes(&mut processes, SortKey::CpuPercent, false);
        assert_eq!(cpus(&processes), vec![5.0, 10.0, 50.0]);
    }

    #[test]
    fn sorts_names_case_insensitively() {
        let mut processes = vec![process(1, "zsh", 0.0), process(2, "Bash", 0.0), process(3, "apt", 0.0)];
        sort_processes(&mut processes, SortKey::Name, false);
        let names: Vec<_> = processes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["apt", "Bash", "zsh"]);
    }

    #[test]
    fn descending_keeps_ties_in_order() {
        let mut processes = vec![process(7, "a", 1.0), process(3, "b", 1.0), process(9, "c", 2.0)];
        sort_processes(&mut processes, SortKey::CpuPercent, true);
        let pids: Vec<_> = processes.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![9, 7, 3]);
    }

    #[test]
    fn sort_keys_parse() {
        assert_eq!("cpu_percent".parse::<SortKey>().unwrap(), SortKey::CpuPercent);
        assert_eq!("disk_total_mb".parse::<SortKey>().unwrap(), SortKey::DiskTotalMb);
        assert!(matches!(
            "rss".parse::<SortKey>(),
            Err(Error::UnknownSortKey(key)) if key == "rss"
        ));
        assert_eq!("disk".parse::<TopBy>().unwrap().sort_key(), SortKey::DiskTotalMb);
    }

    #[test]
    fn summary_sums_without_normalizing() {
        let mut processes = vec![process(1, "a", 80.0), process(2, "b", 90.0), process(3, "c", 70.0)];
        processes[2].status = "running".to_string();
        let summary = summarize(&processes);
        assert_eq!(summary.total_processes, 3);
        assert_eq!(summary.status_breakdown["sleeping"], 2);
        assert_eq!(summary.status_breakdown["running"], 1);
        assert!((summary.total_cpu_percent - 240.0).abs() < 1e-6);
        assert!((summary.total_memory_percent - 24.0).abs() < 1e-4);
    }

    #[test]
    fn query_matches_name_pid_and_cmdline() {
        let mut p = process(4242, "Firefox", 0.0);
        p.cmdline = "/usr/lib/firefox/firefox --new-window".to_string();
        assert!(matches_query(&p, "FIRE"));
        assert!(matches_query(&p, "424"));
        assert!(matches_query(&p, "new-window"));
        assert!(!matches_query(&p, "chrome"));
    }

    #[test]
    fn long_command_lines_are_cut() {
        let long = "x".repeat(150);
        let cut = truncate_cmdline(long);
        assert_eq!(cut.len(), CMDLINE_DISPLAY_LEN + 3);
        assert!(cut.ends_with("..."));

        let exact = "é".repeat(CMDLINE_DISPLAY_LEN);
        assert_eq!(truncate_cmdline(exact.clone()), exact);
    }

    #[test]
    fn runtime_formatting() {
        assert_eq!(format_runtime(59), "0:00:59");
        assert_eq!(format_runtime(3 * 3600 + 4 * 60 + 5), "3:04:05");
        assert_eq!(format_runtime(86_400 + 61), "1 day, 0:01:01");
        assert_eq!(format_runtime(2 * 86_400), "2 days, 0:00:00");
    }
}
