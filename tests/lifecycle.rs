use std::thread;
use std::time::{Duration, Instant};
use sysmon::metrics::cpu::CpuMonitor;
use sysmon::metrics::disk::DiskMonitor;
use sysmon::metrics::memory::MemoryMonitor;
use sysmon::metrics::network::NetworkMonitor;
use sysmon::metrics::process::ProcessMonitor;
use sysmon::{Metrics, MonitorSettings, Settings};

fn fast() -> MonitorSettings {
    MonitorSettings {
        history_duration_secs: 2,
        update_interval_ms: 200,
    }
}

#[test]
fn cpu_history_is_bounded_and_ordered() {
    let mut monitor = CpuMonitor::new(MonitorSettings::new(5, 1));
    monitor.start_monitoring();
    thread::sleep(Duration::from_secs(6));
    monitor.stop_monitoring();

    let history = monitor.get_history();
    assert!(!history.timestamps.is_empty());
    assert!(history.timestamps.len() <= 5);
    assert_eq!(history.timestamps.len(), history.cpu_usage.len());
    assert_eq!(history.timestamps.len(), history.per_cpu_usage.len());
    assert!(history.timestamps.windows(2).all(|w| w[0] < w[1]));
    assert!(history
        .cpu_usage
        .iter()
        .all(|usage| (0.0..=100.0).contains(usage)));
}

#[test]
fn every_history_stays_index_aligned() {
    let settings = Settings {
        cpu: fast(),
        memory: fast(),
        disk: fast(),
        network: fast(),
        process: fast(),
    };
    let mut metrics = Metrics::new(&settings);
    metrics.start_all();
    assert!(metrics.is_monitoring());
    thread::sleep(Duration::from_millis(1_100));

    for _ in 0..3 {
        let memory = metrics.memory.get_history();
        assert_eq!(memory.timestamps.len(), memory.memory_percent.len());
        assert_eq!(memory.timestamps.len(), memory.memory_used_gb.len());
        assert_eq!(memory.timestamps.len(), memory.swap_percent.len());

        let disk = metrics.disk.get_history();
        assert_eq!(disk.timestamps.len(), disk.disk_usage.len());
        assert_eq!(disk.timestamps.len(), disk.io_stats.len());

        let network = metrics.network.get_history();
        assert_eq!(network.timestamps.len(), network.upload_kbps.len());
        assert_eq!(network.timestamps.len(), network.download_kbps.len());
        assert!(network.timestamps.len() <= fast().capacity());

        let process = metrics.process.get_history();
        assert_eq!(process.timestamps.len(), process.counts.len());

        thread::sleep(Duration::from_millis(150));
    }

    metrics.stop_all();
    assert!(!metrics.is_monitoring());
    assert!(!metrics.process.get_history().counts.is_empty());
}

#[test]
fn first_recorded_network_tick_is_not_negative() {
    let mut monitor = NetworkMonitor::new(fast());
    monitor.start_monitoring();
    thread::sleep(Duration::from_millis(500));
    monitor.stop_monitoring();

    let history = monitor.get_history();
    assert!(history
        .upload_kbps
        .iter()
        .chain(&history.download_kbps)
        .all(|speed| *speed >= 0.0));
}

#[test]
fn double_start_and_idle_stop() {
    let mut memory = MemoryMonitor::new(fast());
    let begin = Instant::now();
    memory.stop_monitoring();
    assert!(begin.elapsed() < Duration::from_millis(100));

    memory.start_monitoring();
    memory.start_monitoring();
    assert!(memory.is_monitoring());
    memory.stop_monitoring();
    memory.stop_monitoring();
    assert!(!memory.is_monitoring());
}

#[test]
fn stop_returns_within_timeout_for_long_intervals() {
    let mut disk = DiskMonitor::new(MonitorSettings::new(3600, 600));
    disk.start_monitoring();
    let begin = Instant::now();
    disk.stop_monitoring();
    assert!(begin.elapsed() < Duration::from_secs(2));
    assert!(disk.get_history().timestamps.is_empty());
}

#[test]
fn restart_continues_the_same_history() {
    let mut process = ProcessMonitor::new(fast());
    process.start_monitoring();
    thread::sleep(Duration::from_millis(500));
    process.stop_monitoring();
    let first = process.get_history().counts.len();

    process.start_monitoring();
    thread::sleep(Duration::from_millis(500));
    process.stop_monitoring();
    assert!(process.get_history().counts.len() >= first);
}

#[test]
fn snapshots_have_sane_values() {
    let cpu = CpuMonitor::default().get_current_stats();
    assert!((0.0..=100.0).contains(&cpu.usage_percent));
    assert_eq!(cpu.per_cpu_percent.len(), cpu.cpu_count.logical);

    let memory = MemoryMonitor::default().get_current_stats();
    assert!(memory.memory.total > 0);
    assert!((0.0..=1.0).contains(&memory.fragmentation.ratio));

    let network = NetworkMonitor::default().get_current_stats();
    assert_eq!(network.speeds.upload, 0.0);
    assert_eq!(network.speeds.download, 0.0);
}
