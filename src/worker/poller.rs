//! Waiting for the classifier's output file to appear.

use super::supervisor::SupervisedProcess;
use super::Interruption;
use std::path::Path;
use std::time::{Duration, Instant};

/// How the wait for the output file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The file exists and can be opened
    Ready,
    /// The process exited before writing anything
    ProcessExited,
    /// The file did not show up within the startup timeout
    TimedOut,
    /// Stop was requested while waiting
    Interrupted,
}

/// Poll for `path` while the process runs.
///
/// Each iteration waits up to `interval` for the process to exit, so a dead
/// process is noticed within one interval. The process is not killed here;
/// that is the caller's decision.
pub fn wait_for_output(
    path: &Path,
    process: &mut SupervisedProcess,
    interruption: &Interruption,
    startup_timeout: Duration,
    interval: Duration,
) -> PollOutcome {
    let started = Instant::now();
    loop {
        if path.exists() {
            return PollOutcome::Ready;
        }
        if interruption.is_requested() {
            return PollOutcome::Interrupted;
        }
        if process.wait_timeout(interval) {
            // one last look: the file may have been written just before exit
            if path.exists() {
                return PollOutcome::Ready;
            }
            return PollOutcome::ProcessExited;
        }
        if started.elapsed() >= startup_timeout {
            return PollOutcome::TimedOut;
        }
    }
}
