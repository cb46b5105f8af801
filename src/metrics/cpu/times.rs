#![cfg_attr(not(target_os = "linux"), allow(dead_code))]

use super::CpuTimesPercent;
use crate::error::{Error, Result};
use serde::Serialize;

/// `USER_HZ` when `sysconf` cannot report it.
const DEFAULT_CLOCK_TICKS: f64 = 100.0;

/// Kernel clock ticks per second, the unit of `/proc` time counters.
#[cfg(unix)]
pub(crate) fn clock_ticks() -> f64 {
    match nix::unistd::sysconf(nix::unistd::SysconfVar::CLK_TCK) {
        Ok(Some(ticks)) if ticks > 0 => ticks as f64,
        _ => DEFAULT_CLOCK_TICKS,
    }
}

#[cfg(not(unix))]
pub(crate) fn clock_ticks() -> f64 {
    DEFAULT_CLOCK_TICKS
}

/// Cumulative CPU time by mode, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CpuTimes {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    /// Every mode summed, guest time excluded.
    #[serde(skip)]
    pub total: f64,
}

impl CpuTimes {
    /// Percentages of the window between `earlier` and `self`.
    pub fn percent_since(&self, earlier: &CpuTimes) -> Option<CpuTimesPercent> {
        let total = self.total - earlier.total;
        if total <= 0.0 {
            return None;
        }
        let pct = |now: f64, then: f64| ((now - then) / total * 100.0).clamp(0.0, 100.0);
        Some(CpuTimesPercent {
            user: pct(self.user, earlier.user),
            system: pct(self.system, earlier.system),
            idle: pct(self.idle, earlier.idle),
        })
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat`, counted in `hz` ticks
/// per second.
pub(super) fn parse_proc_stat(content: &str, hz: f64) -> Result<CpuTimes> {
    let line = content
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| Error::parse("/proc/stat", "missing aggregate cpu line"))?;

    let ticks = line
        .split_whitespace()
        .skip(1)
        .map(|field| field.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| Error::parse("/proc/stat", line))?;
    if ticks.len() < 4 {
        return Err(Error::parse("/proc/stat", line));
    }

    // user nice system idle iowait irq softirq steal guest guest_nice
    let total: u64 = ticks.iter().take(8).sum();
    Ok(CpuTimes {
        user: ticks[0] as f64 / hz,
        system: ticks[2] as f64 / hz,
        idle: ticks[3] as f64 / hz,
        total: total as f64 / hz,
    })
}

#[cfg(target_os = "linux")]
pub(super) fn read_cpu_times() -> Result<CpuTimes> {
    parse_proc_stat(
        &crate::error::read_to_string("/proc/stat")?,
        clock_ticks(),
    )
}

#[cfg(not(target_os = "linux"))]
pub(super) fn read_cpu_times() -> Result<CpuTimes> {
    Err(Error::Unsupported("cpu times"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  4705 356 584 3699 23 0 16 0 0 0\n\
                        cpu0 1393 280 307 1878 11 0 8 0 0 0\n\
                        intr 114930548 113199788 3 0 5\n";

    #[test]
    fn parses_aggregate_line() {
        let times = parse_proc_stat(STAT, 100.0).unwrap();
        assert!((times.user - 47.05).abs() < 1e-9);
        assert!((times.system - 5.84).abs() < 1e-9);
        assert!((times.idle - 36.99).abs() < 1e-9);
        assert!((times.total - 93.83).abs() < 1e-9);
    }

    #[test]
    fn rejects_missing_line() {
        assert!(parse_proc_stat("intr 1 2 3\n", 100.0).is_err());
        assert!(parse_proc_stat("cpu  1 x 3 4\n", 100.0).is_err());
    }

    #[test]
    fn percentages_over_window() {
        let before = parse_proc_stat("cpu  100 0 100 800 0 0 0 0 0 0\n", 100.0).unwrap();
        let after = parse_proc_stat("cpu  130 0 110 860 0 0 0 0 0 0\n", 100.0).unwrap();
        let pct = after.percent_since(&before).unwrap();
        assert!((pct.user - 30.0).abs() < 1e-9);
        assert!((pct.system - 10.0).abs() < 1e-9);
        assert!((pct.idle - 60.0).abs() < 1e-9);
    }

    #[test]
    fn seconds_follow_clock_rate() {
        let times = parse_proc_stat(STAT, 250.0).unwrap();
        assert!((times.user - 18.82).abs() < 1e-9);
        assert!(clock_ticks() > 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn live_times_use_kernel_clock_rate() {
        let times = read_cpu_times().unwrap();
        let content = std::fs::read_to_string("/proc/stat").unwrap();
        let user_ticks: f64 = content.split_whitespace().nth(1).unwrap().parse().unwrap();
        // counters only grow between the two reads
        assert!(times.user * clock_ticks() <= user_ticks + 1e-6);
    }

    #[test]
    fn empty_window_has_no_percentages() {
        let times = parse_proc_stat(STAT, 100.0).unwrap();
        assert!(times.percent_since(&times).is_none());
    }
}
