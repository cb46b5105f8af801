use std::time::Instant;

/// Smallest elapsed time used as a divisor, in seconds.
pub const MIN_ELAPSED_SECS: f64 = 1e-3;

/// Bytes per second between two cumulative counter readings.
///
/// A counter that went backwards (interface reset, wrap) yields 0.
pub fn rate(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    current.saturating_sub(previous) as f64 / elapsed_secs.max(MIN_ELAPSED_SECS)
}

/// Previous-reading cache for a pair of cumulative byte counters
/// (sent/received, read/written).
#[derive(Debug, Clone, Default)]
pub struct RateState {
    last: Option<Reading>,
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    first: u64,
    second: u64,
    at: Instant,
}

impl RateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a reading and returns the per-second rates since the previous
    /// one. The first reading after creation or [`RateState::reset`] has no
    /// baseline and yields `(0.0, 0.0)`.
    pub fn observe(&mut self, first: u64, second: u64, at: Instant) -> (f64, f64) {
        let rates = match self.last {
            Some(last) if at > last.at => {
                let elapsed = at.duration_since(last.at).as_secs_f64();
                (
                    rate(last.first, first, elapsed),
                    rate(last.second, second, elapsed),
                )
            }
            _ => (0.0, 0.0),
        };
        self.last = Some(Reading { first, second, at });
        rates
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn has_baseline(&self) -> bool {
        self.last.is_some()
    }
}

/// Formats a throughput the way the dashboards show it.
pub fn format_speed(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    if bytes_per_sec < KB {
        format!("{bytes_per_sec:.1} B/s")
    } else if bytes_per_sec < KB * KB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else if bytes_per_sec < KB * KB * KB {
        format!("{:.1} MB/s", bytes_per_sec / (KB * KB))
    } else {
        format!("{:.1} GB/s", bytes_per_sec / (KB * KB * KB))
    }
}
