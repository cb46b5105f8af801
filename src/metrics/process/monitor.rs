use super::procfs::{self, Access};
use super::{
    matches_query, sort_processes, summarize, truncate_cmdline, KillResult, KillStatus,
    ProcessDetail, ProcessHistory, ProcessLookup, ProcessSummary, ProcessSystemSummary, SortKey,
    TopBy, ENVIRON_LIMIT, MB,
};
use crate::config::MonitorSettings;
use crate::metrics::history::HistoryBuffer;
use crate::metrics::memory::percent;
use crate::metrics::network;
use crate::metrics::recorder::{Recorder, Sampler};
use crate::metrics::{record_into, SharedHistory};
use chrono::{DateTime, Local, TimeZone};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind, Users,
};

/// How long [`ProcessMonitor::kill_process`] waits for the target to exit.
pub const KILL_WAIT: Duration = Duration::from_secs(3);
const KILL_POLL: Duration = Duration::from_millis(100);

/// Process listing, inspection and termination, plus a process-count history.
#[derive(Debug)]
pub struct ProcessMonitor {
    settings: MonitorSettings,
    /// Kept between list calls so CPU usage is measured since the previous one.
    system: Mutex<System>,
    history: SharedHistory<usize>,
    recorder: Recorder,
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::new(3600, 1))
    }
}

impl ProcessMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            system: Mutex::new(System::new()),
            history: Arc::new(Mutex::new(HistoryBuffer::new(settings.capacity()))),
            recorder: Recorder::new("process"),
        }
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    /// Every visible process, ordered by `sort_by`. Processes that vanish
    /// during enumeration are left out. CPU usage is relative to the
    /// previous call on this monitor and reads zero on the first.
    pub fn get_process_list(&self, sort_by: SortKey, descending: bool) -> Vec<ProcessSummary> {
        let users = Users::new_with_refreshed_list();
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_disk_usage()
                .with_user(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );

        let total_memory = system.total_memory();
        let mut processes: Vec<ProcessSummary> = system
            .processes()
            .values()
            .filter(|process| process.thread_kind().is_none())
            .map(|process| collect_summary(process, &users, total_memory))
            .collect();
        drop(system);

        sort_processes(&mut processes, sort_by, descending);
        processes
    }

    pub fn get_process_count(&self) -> usize {
        count_processes(&mut self.system.lock())
    }

    /// Deep inspection of one process.
    ///
    /// `None` when the process does not exist or exits while being
    /// inspected; [`ProcessLookup::AccessDenied`] when it exists but cannot
    /// be read at all.
    pub fn get_process_by_pid(&self, pid: u32) -> Option<ProcessLookup> {
        match procfs::access(pid) {
            Access::Missing => return None,
            Access::Denied => return Some(ProcessLookup::AccessDenied { pid }),
            Access::Readable => {}
        }

        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_memory();
        refresh_one(&mut system, target, ProcessRefreshKind::everything());
        system.process(target)?;

        // CPU usage needs two readings.
        thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        refresh_one(&mut system, target, ProcessRefreshKind::everything());
        let process = system.process(target)?;
        if is_gone(process) {
            return None;
        }

        let started = process.start_time();
        let users = Users::new_with_refreshed_list();
        let detail = collect_detail(process, &users, system.total_memory());

        // An exit during collection leaves the procfs fields empty.
        if !still_running(&mut system, target, started) {
            debug!("process {pid} exited while being inspected");
            return None;
        }
        Some(ProcessLookup::Found(Box::new(detail)))
    }

    /// Sends SIGTERM (or SIGKILL when `force`) and waits up to [`KILL_WAIT`]
    /// for the process to exit. Failures come back as a result, never a panic.
    pub fn kill_process(&self, pid: u32, force: bool) -> KillResult {
        // pid 0 and negative pids address process groups.
        if pid == 0 || i32::try_from(pid).is_err() {
            return KillResult::not_found(pid);
        }

        let target = Pid::from_u32(pid);
        let mut system = System::new();
        refresh_one(&mut system, target, ProcessRefreshKind::nothing());
        let Some(name) = system
            .process(target)
            .map(|process| process.name().to_string_lossy().into_owned())
        else {
            return KillResult::not_found(pid);
        };

        if let Err(err) = signal::send(&system, target, force) {
            let (status, message) = match err {
                signal::SignalError::NotFound => return KillResult::not_found(pid),
                signal::SignalError::PermissionDenied => (
                    KillStatus::PermissionDenied,
                    format!("permission denied to terminate process {pid}, try with elevated privileges"),
                ),
                signal::SignalError::Other(reason) => (
                    KillStatus::Failed,
                    format!("failed to terminate process {pid}: {reason}"),
                ),
            };
            warn!("{message}");
            return KillResult {
                name: Some(name),
                ..KillResult::failure(pid, status, message)
            };
        }

        let action = if force {
            "killed (SIGKILL)"
        } else {
            "terminated (SIGTERM)"
        };
        if wait_for_exit(&mut system, target, KILL_WAIT) {
            info!("process {name} ({pid}) {action}");
            KillResult {
                success: true,
                status: KillStatus::Exited,
                message: format!("process {name} (PID {pid}) {action}"),
                pid,
                name: Some(name),
                warning: None,
            }
        } else {
            KillResult {
                success: true,
                status: KillStatus::SignalSent,
                message: format!("signal sent to {name} (PID {pid}), waiting for it to exit"),
                pid,
                name: Some(name),
                warning: Some(format!(
                    "process did not exit within {} seconds",
                    KILL_WAIT.as_secs()
                )),
            }
        }
    }

    /// Processes whose name, pid or command line contains `query`, ignoring case.
    pub fn search_processes(&self, query: &str) -> Vec<ProcessSummary> {
        let mut processes = self.get_process_list(SortKey::default(), true);
        processes.retain(|process| matches_query(process, query));
        processes
    }

    pub fn get_top_processes(&self, by: TopBy, limit: usize) -> Vec<ProcessSummary> {
        let mut processes = self.get_process_list(by.sort_key(), true);
        processes.truncate(limit);
        processes
    }

    pub fn get_system_summary(&self) -> ProcessSystemSummary {
        summarize(&self.get_process_list(SortKey::default(), true))
    }

    pub fn get_history(&self) -> ProcessHistory {
        let history = self.history.lock();
        ProcessHistory {
            timestamps: history.timestamps(),
            counts: history.series(|count| *count),
        }
    }

    pub fn start_monitoring(&mut self) {
        let sampler = CountSampler {
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

fn refresh_one(system: &mut System, pid: Pid, kind: ProcessRefreshKind) {
    system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, kind);
}

fn count_processes(system: &mut System) -> usize {
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::nothing());
    system
        .processes()
        .values()
        .filter(|process| process.thread_kind().is_none())
        .count()
}

fn is_gone(process: &Process) -> bool {
    matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

/// Whether `pid` is still the live process that started at `started`.
fn still_running(system: &mut System, pid: Pid, started: u64) -> bool {
    if procfs::access(pid.as_u32()) == Access::Missing {
        return false;
    }
    refresh_one(system, pid, ProcessRefreshKind::nothing());
    system
        .process(pid)
        .is_some_and(|process| !is_gone(process) && process.start_time() == started)
}

fn wait_for_exit(system: &mut System, pid: Pid, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        refresh_one(system, pid, ProcessRefreshKind::nothing());
        if system.process(pid).map_or(true, is_gone) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(KILL_POLL);
    }
}

fn username(process: &Process, users: &Users) -> Option<String> {
    let uid = process.user_id()?;
    users.get_user_by_id(uid).map(|user| user.name().to_string())
}

fn start_time(process: &Process) -> Option<DateTime<Local>> {
    let secs = i64::try_from(process.start_time()).ok()?;
    Local.timestamp_opt(secs, 0).single()
}

fn status(process: &Process) -> String {
    process.status().to_string().to_lowercase()
}

fn cmdline(process: &Process) -> Vec<String> {
    process
        .cmd()
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

fn thread_count(process: &Process) -> usize {
    process.tasks().map_or(1, |tasks| tasks.len().max(1))
}

fn collect_summary(process: &Process, users: &Users, total_memory: u64) -> ProcessSummary {
    let disk = process.disk_usage();
    let rss = process.memory();
    ProcessSummary {
        pid: process.pid().as_u32(),
        name: process.name().to_string_lossy().into_owned(),
        status: status(process),
        cpu_percent: process.cpu_usage(),
        memory_percent: percent(rss, total_memory),
        memory_mb: rss as f64 / MB,
        memory_rss: rss,
        memory_vms: process.virtual_memory(),
        username: username(process, users),
        start_time: start_time(process),
        runtime_secs: process.run_time(),
        num_threads: thread_count(process),
        disk_read_mb: disk.total_read_bytes as f64 / MB,
        disk_write_mb: disk.total_written_bytes as f64 / MB,
        disk_total_mb: (disk.total_read_bytes + disk.total_written_bytes) as f64 / MB,
        cmdline: truncate_cmdline(cmdline(process).join(" ")),
    }
}

fn collect_detail(process: &Process, users: &Users, total_memory: u64) -> ProcessDetail {
    let pid = process.pid().as_u32();
    let disk = process.disk_usage();
    let rss = process.memory();
    let threads = procfs::threads(pid);
    ProcessDetail {
        pid,
        parent_pid: process.parent().map(|parent| parent.as_u32()),
        name: process.name().to_string_lossy().into_owned(),
        status: status(process),
        username: username(process, users),
        start_time: start_time(process),
        runtime_secs: process.run_time(),
        cpu_percent: process.cpu_usage(),
        cpu_times: procfs::cpu_times(pid),
        memory_rss: rss,
        memory_vms: process.virtual_memory(),
        memory_percent: percent(rss, total_memory),
        memory_mb: rss as f64 / MB,
        io_read_bytes: disk.total_read_bytes,
        io_write_bytes: disk.total_written_bytes,
        num_threads: if threads.is_empty() {
            thread_count(process)
        } else {
            threads.len()
        },
        threads,
        open_files: procfs::open_files(pid),
        connections: network::connections_of(pid),
        cmdline: cmdline(process),
        exe: process.exe().map(|path| path.to_string_lossy().into_owned()),
        cwd: process.cwd().map(|path| path.to_string_lossy().into_owned()),
        environ: process
            .environ()
            .iter()
            .filter_map(|var| {
                let var = var.to_string_lossy();
                let (key, value) = var.split_once('=')?;
                Some((key.to_string(), value.to_string()))
            })
            .take(ENVIRON_LIMIT)
            .collect(),
    }
}

struct CountSampler {
    system: System,
}

impl Sampler for CountSampler {
    type Sample = usize;

    fn sample(&mut self) -> Option<usize> {
        let count = count_processes(&mut self.system);
        debug!("process tick: {count} processes");
        // An empty table means the enumeration failed.
        (count > 0).then_some(count)
    }
}

#[cfg(unix)]
mod signal {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use sysinfo::{Pid, System};

    pub(super) enum SignalError {
        NotFound,
        PermissionDenied,
        Other(String),
    }

    pub(super) fn send(_system: &System, pid: Pid, force: bool) -> Result<(), SignalError> {
        let raw = i32::try_from(pid.as_u32()).map_err(|_| SignalError::NotFound)?;
        let signal = if force {
            Signal::SIGKILL
        } else {
            Signal::SIGTERM
        };
        match kill(nix::unistd::Pid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(SignalError::NotFound),
            Err(Errno::EPERM) => Err(SignalError::PermissionDenied),
            Err(errno) => Err(SignalError::Other(errno.desc().to_string())),
        }
    }
}

#[cfg(not(unix))]
mod signal {
    use sysinfo::{Pid, Signal, System};

    pub(super) enum SignalError {
        NotFound,
        PermissionDenied,
        Other(String),
    }

    pub(super) fn send(system: &System, pid: Pid, force: bool) -> Result<(), SignalError> {
        let process = system.process(pid).ok_or(SignalError::NotFound)?;
        let signal = if force { Signal::Kill } else { Signal::Term };
        match process.kill_with(signal) {
            Some(true) => Ok(()),
            // Graceful termination is not available everywhere.
            None if process.kill() => Ok(()),
            None => Err(SignalError::Other("signal not supported".to_string())),
            Some(false) => Err(SignalError::PermissionDenied),
        }
    }
}
