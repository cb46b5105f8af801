//! Best-effort execution of platform utilities.

use crate::error::{Error, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs `program` and returns its stdout, killing it after `timeout`.
///
/// A non-zero exit status is an error, so callers can treat any `Err` as
/// "probe unavailable".
pub fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let command = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    let probe_error = |reason: String| Error::Probe {
        command: command.clone(),
        reason,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| probe_error(err.to_string()))?;

    // Drain stdout concurrently so a chatty tool cannot block on a full pipe.
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| probe_error("stdout not captured".to_string()))?;
    let reader = thread::spawn(move || {
        let mut output = String::new();
        stdout.read_to_string(&mut output).map(|_| output)
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::ProbeTimeout {
                    command,
                    timeout_secs: timeout.as_secs(),
                });
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let output = reader
        .join()
        .map_err(|_| probe_error("output reader panicked".to_string()))??;
    if !status.success() {
        return Err(probe_error(format!("exited with {status}")));
    }
    Ok(output)
}
