use clap::Parser;
use log::{error, info};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};
use sysmon::{Metrics, Settings};

#[derive(Parser, Debug)]
#[command(name = "sysmon")]
#[command(about = "Samples CPU, memory, disk, network and process metrics in the background")]
struct Args {
    /// JSON settings file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long to run, in seconds
    #[arg(short, long, default_value = "60")]
    duration: u64,

    /// Seconds between summary reports
    #[arg(short, long, default_value = "5")]
    report_every: u64,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => match Settings::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                error!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };

    let mut metrics = Metrics::new(&settings);
    metrics.start_all();

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let period = Duration::from_secs(args.report_every.max(1));
    while Instant::now() < deadline {
        thread::sleep(period.min(deadline.saturating_duration_since(Instant::now())));
        report(&metrics);
    }

    metrics.stop_all();
    ExitCode::SUCCESS
}

fn report(metrics: &Metrics) {
    let cpu = metrics.cpu.get_history();
    let memory = metrics.memory.get_history();
    let disk = metrics.disk.get_history();
    let network = metrics.network.get_history();
    let process = metrics.process.get_history();

    let summary = json!({
        "cpu_percent": cpu.cpu_usage.last(),
        "memory_percent": memory.memory_percent.last(),
        "swap_percent": memory.swap_percent.last(),
        "disk_io": disk.io_stats.last().copied().flatten().map(|io| json!({
            "read_mb_s": io.read_speed_mb(),
            "write_mb_s": io.write_speed_mb(),
        })),
        "network_kbps": {
            "upload": network.upload_kbps.last(),
            "download": network.download_kbps.last(),
        },
        "process_count": process.counts.last(),
        "samples": {
            "cpu": cpu.timestamps.len(),
            "memory": memory.timestamps.len(),
            "disk": disk.timestamps.len(),
            "network": network.timestamps.len(),
            "process": process.timestamps.len(),
        },
    });
    info!("{summary}");
}
