use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long [`Recorder::stop`] waits for the worker to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Produces one history sample per recorder tick.
pub trait Sampler: Send + 'static {
    type Sample: Send + 'static;

    /// Called once on the worker before the first tick, for readings that
    /// need a baseline (CPU usage, byte counters).
    fn prime(&mut self) {}

    /// Takes a sample; `None` skips the tick without touching history.
    fn sample(&mut self) -> Option<Self::Sample>;
}

#[derive(Debug, Default)]
struct State {
    running: bool,
    exited: bool,
}

#[derive(Debug, Default)]
struct Signal {
    state: Mutex<State>,
    cond: Condvar,
}

impl Signal {
    /// Sleeps for `duration` unless stopped first. Returns whether the
    /// worker should keep going.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        while state.running {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.running
    }

    fn request_stop(&self) {
        self.state.lock().running = false;
        self.cond.notify_all();
    }

    fn wait_exited(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.exited {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.exited
    }
}

/// Marks the worker as exited even if the sampler panics.
struct ExitGuard(Arc<Signal>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.running = false;
        state.exited = true;
        self.0.cond.notify_all();
    }
}

/// Lifecycle of one monitor's background sampling thread.
///
/// At most one worker runs per recorder. The owner stops it explicitly;
/// dropping a running recorder stops it too.
#[derive(Debug)]
pub struct Recorder {
    name: &'static str,
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl Recorder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            signal: Arc::new(Signal::default()),
            handle: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawns the worker: prime, then sleep `interval`, sample, hand the
    /// sample to `record`, until stopped. No-op when already running.
    pub fn start<S, F>(&mut self, interval: Duration, mut sampler: S, mut record: F)
    where
        S: Sampler,
        F: FnMut(S::Sample) + Send + 'static,
    {
        if self.handle.is_some() {
            debug!("{} recorder already running", self.name);
            return;
        }

        // A fresh signal per run, so a worker detached by a timed-out stop
        // keeps watching its own flag.
        let signal = Arc::new(Signal::default());
        signal.state.lock().running = true;

        let name = self.name;
        let worker_signal = Arc::clone(&signal);
        let spawned = thread::Builder::new()
            .name(format!("sysmon-{name}"))
            .spawn(move || {
                let guard = ExitGuard(worker_signal);
                sampler.prime();
                while guard.0.sleep(interval) {
                    match sampler.sample() {
                        Some(sample) => {
                            // Held while recording so a stop cannot slip in between.
                            let state = guard.0.state.lock();
                            if !state.running {
                                debug!("{name} recorder stopped mid-sample, dropping it");
                                break;
                            }
                            record(sample);
                        }
                        None => debug!("{name} recorder skipped a tick"),
                    }
                }
                debug!("{name} recorder exiting");
            });

        match spawned {
            Ok(handle) => {
                info!("{name} recorder started, interval {interval:?}");
                self.signal = signal;
                self.handle = Some(handle);
            }
            Err(err) => error!("failed to spawn {name} recorder: {err}"),
        }
    }

    /// Stops the worker, waiting at most [`STOP_TIMEOUT`] for it to exit.
    /// No-op when not running.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.signal.request_stop();
        if self.signal.wait_exited(STOP_TIMEOUT) {
            if handle.join().is_err() {
                warn!("{} recorder panicked", self.name);
            }
            info!("{} recorder stopped", self.name);
        } else {
            warn!(
                "{} recorder did not exit within {:?}, detaching it",
                self.name, STOP_TIMEOUT
            );
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        primed: Arc<AtomicUsize>,
        next: usize,
    }

    impl Sampler for Counter {
        type Sample = usize;

        fn prime(&mut self) {
            self.primed.fetch_add(1, Ordering::SeqCst);
        }

        fn sample(&mut self) -> Option<usize> {
            self.next += 1;
            // every third tick fails
            (self.next % 3 != 0).then_some(self.next)
        }
    }

    fn counter() -> (Counter, Arc<AtomicUsize>) {
        let primed = Arc::new(AtomicUsize::new(0));
        (
            Counter {
                primed: Arc::clone(&primed),
                next: 0,
            },
            primed,
        )
    }

    #[test]
    fn stop_without_start_returns_promptly() {
        let mut recorder = Recorder::new("idle");
        let begin = Instant::now();
        recorder.stop();
        recorder.stop();
        assert!(begin.elapsed() < Duration::from_millis(100));
        assert!(!recorder.is_running());
    }

    #[test]
    fn double_start_spawns_one_worker() {
        let mut recorder = Recorder::new("twice");
        let (first, first_primed) = counter();
        let (second, second_primed) = counter();

        recorder.start(Duration::from_millis(10), first, |_| {});
        recorder.start(Duration::from_millis(10), second, |_| {});
        thread::sleep(Duration::from_millis(50));

        assert!(recorder.is_running());
        assert_eq!(first_primed.load(Ordering::SeqCst), 1);
        assert_eq!(second_primed.load(Ordering::SeqCst), 0);
        recorder.stop();
        assert!(!recorder.is_running());
    }

    #[test]
    fn failed_ticks_are_skipped() {
        let mut recorder = Recorder::new("skips");
        let (sampler, _) = counter();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        recorder.start(Duration::from_millis(5), sampler, move |n| sink.lock().push(n));
        thread::sleep(Duration::from_millis(100));
        recorder.stop();

        let seen = seen.lock();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|n| n % 3 != 0));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    struct Slow;

    impl Sampler for Slow {
        type Sample = ();

        fn sample(&mut self) -> Option<()> {
            thread::sleep(Duration::from_millis(300));
            Some(())
        }
    }

    #[test]
    fn stop_during_sample_drops_it() {
        let mut recorder = Recorder::new("slow");
        let recorded = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&recorded);

        recorder.start(Duration::from_millis(1), Slow, move |()| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(100));
        recorder.stop();

        assert!(!recorder.is_running());
        assert_eq!(recorded.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_interrupts_long_sleep() {
        let mut recorder = Recorder::new("sleepy");
        let (sampler, _) = counter();
        recorder.start(Duration::from_secs(3600), sampler, |_| {});

        let begin = Instant::now();
        recorder.stop();
        assert!(begin.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn restart_after_stop() {
        let mut recorder = Recorder::new("restart");
        let (first, _) = counter();
        recorder.start(Duration::from_millis(5), first, |_| {});
        recorder.stop();

        let (second, primed) = counter();
        recorder.start(Duration::from_millis(5), second, |_| {});
        thread::sleep(Duration::from_millis(30));
        assert!(recorder.is_running());
        assert_eq!(primed.load(Ordering::SeqCst), 1);
    }
}
