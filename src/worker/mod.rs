//! Classification worker: runs the CK tool and streams its results.
//!
//! One run goes through four stages on a dedicated thread:
//!
//! ```text
//! supervisor::spawn ──> poller::wait_for_output ──> tail + parser ──> ResultSink
//!        │                      │ exit / timeout            │
//!        └──────────── teardown (kill, registry, Stopped) <─┘
//! ```
//!
//! The thread never blocks for longer than one poll interval (or the kill
//! wait during teardown) between interruption checks.

pub mod parser;
pub mod poller;
pub mod supervisor;
pub mod tail;

use crate::config::AppConfig;
use crate::error::WorkerError;
use crate::log_parsed;
use crate::models::{Dataset, ImageResult, Model, Program};
use crate::system::{global_registry, ProcessRegistry};
use crate::ui::ResultSink;
use parser::RecordParser;
use poller::{wait_for_output, PollOutcome};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use supervisor::{ClassificationCommand, SupervisedProcess};
use tail::LineTail;
use tokio::sync::watch;

/// Poll interval for file existence and process exit checks.
pub const NORMAL_WAIT: Duration = Duration::from_millis(50);
/// How long a killed process may take to disappear.
pub const KILL_WAIT: Duration = Duration::from_secs(10);

/// Timing knobs of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTimings {
    pub poll_interval: Duration,
    pub kill_wait: Duration,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        WorkerTimings {
            poll_interval: NORMAL_WAIT,
            kill_wait: KILL_WAIT,
        }
    }
}

/// Cooperative stop request, read side.
#[derive(Clone, Debug)]
pub struct Interruption {
    rx: watch::Receiver<bool>,
}

impl Interruption {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Interruption { rx }
    }

    /// A fresh, unset flag and its sender.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Interruption::new(rx))
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The tool exited and all of its output was read
    Completed { images: u64 },
    /// Stopped on request
    Interrupted { images: u64 },
    /// An error was reported through the sink
    Failed { images: u64 },
}

impl RunOutcome {
    pub fn images(&self) -> u64 {
        match *self {
            RunOutcome::Completed { images }
            | RunOutcome::Interrupted { images }
            | RunOutcome::Failed { images } => images,
        }
    }
}

/// Everything needed for one classification run.
#[derive(Debug, Clone)]
pub struct ClassificationWorker {
    pub program: Program,
    pub model: Model,
    pub dataset: Dataset,
    pub batch_size: u32,
    exe: Option<String>,
    working_dir: Option<PathBuf>,
    output_file: PathBuf,
    startup_timeout: Duration,
    timings: WorkerTimings,
    registry: Arc<ProcessRegistry>,
}

impl ClassificationWorker {
    pub fn new(
        config: &AppConfig,
        program: Program,
        model: Model,
        dataset: Dataset,
        batch_size: u32,
    ) -> Self {
        let output_file = config.resolve_output_file(&program);
        ClassificationWorker {
            exe: config.ck_exe().map(str::to_string),
            working_dir: config.ck_bin_dir().map(Path::to_path_buf),
            output_file,
            startup_timeout: Duration::from_secs(config.classification_startup_timeout_seconds),
            timings: WorkerTimings::default(),
            registry: global_registry(),
            program,
            model,
            dataset,
            batch_size,
        }
    }

    pub fn with_timings(mut self, timings: WorkerTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Use a dedicated registry instead of the global one.
    pub fn with_registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// The command this worker runs, if the executable is configured.
    pub fn command(&self) -> Option<ClassificationCommand> {
        self.exe.as_ref().map(|exe| {
            ClassificationCommand::new(
                exe.clone(),
                self.working_dir.clone(),
                &self.program,
                &self.model,
                &self.dataset,
                self.batch_size,
            )
        })
    }

    /// Run on a new thread.
    pub fn spawn<S>(self, mut sink: S, interruption: Interruption) -> std::io::Result<JoinHandle<RunOutcome>>
    where
        S: ResultSink + Send + 'static,
    {
        std::thread::Builder::new()
            .name("classification-worker".to_string())
            .spawn(move || self.run(&mut sink, &interruption))
    }

    /// Run on the calling thread until the tool finishes, fails or is
    /// interrupted. Always ends with the stopped notification.
    pub fn run<S: ResultSink + ?Sized>(&self, sink: &mut S, interruption: &Interruption) -> RunOutcome {
        let outcome = self.execute(sink, interruption);
        self.registry.kill_all();
        log::debug!("Classification worker stopped: {:?}", outcome);
        sink.stopped(outcome);
        outcome
    }

    fn execute<S: ResultSink + ?Sized>(&self, sink: &mut S, interruption: &Interruption) -> RunOutcome {
        let failed = RunOutcome::Failed { images: 0 };

        let command = match self.command() {
            Some(command) => command,
            None => {
                report(sink, WorkerError::MissingExecutable);
                return failed;
            }
        };
        if self.working_dir.is_none() {
            report(sink, WorkerError::MissingWorkingDirectory);
        }

        let command_line = command.command_line();
        log::debug!("Run CK command: {}", command_line);

        remove_stale_output(&self.output_file);

        let mut process = match command.spawn() {
            Ok(process) => process,
            Err(e) => {
                report(sink, e);
                return failed;
            }
        };
        self.registry.register_pid(process.id());
        self.registry.register_name(&self.program.exe);

        log_parsed!("Waiting until the program starts writing classification data");
        let outcome = wait_for_output(
            &self.output_file,
            &mut process,
            interruption,
            self.startup_timeout,
            self.timings.poll_interval,
        );
        match outcome {
            PollOutcome::Ready => {}
            PollOutcome::ProcessExited => {
                self.registry.mark_exited(process.id());
                report(
                    sink,
                    WorkerError::PrematureExit {
                        command: command_line,
                    },
                );
                return failed;
            }
            PollOutcome::TimedOut => {
                self.terminate(&mut process);
                report(
                    sink,
                    WorkerError::StartupTimeout {
                        command: command_line,
                        timeout_secs: self.startup_timeout.as_secs_f64(),
                    },
                );
                return failed;
            }
            PollOutcome::Interrupted => {
                log::info!("Worker process interrupted by user request");
                self.terminate(&mut process);
                return RunOutcome::Interrupted { images: 0 };
            }
        }

        let file = match File::open(&self.output_file) {
            Ok(file) => file,
            Err(e) => {
                self.terminate(&mut process);
                report(sink, WorkerError::Io(e));
                return failed;
            }
        };

        log_parsed!("Starting reading classification data");
        let (images, read_error) = self.stream_results(file, &mut process, sink, interruption);

        if let Some(e) = read_error {
            self.terminate(&mut process);
            report(sink, WorkerError::Io(e));
            return RunOutcome::Failed { images };
        }
        if interruption.is_requested() {
            log::info!("Worker process interrupted by user request");
            self.terminate(&mut process);
            log::debug!("Closing classification data file");
            return RunOutcome::Interrupted { images };
        }

        self.registry.mark_exited(process.id());
        log::info!("Worker process finished");
        log::debug!("Closing classification data file");
        RunOutcome::Completed { images }
    }

    /// Tail the output file until the process is done and the file is
    /// drained, or until interruption. Returns the number of records
    /// forwarded and the read error that ended the loop, if any.
    fn stream_results<S: ResultSink + ?Sized>(
        &self,
        file: File,
        process: &mut SupervisedProcess,
        sink: &mut S,
        interruption: &Interruption,
    ) -> (u64, Option<std::io::Error>) {
        let mut tail = LineTail::new(file);
        let mut parser = RecordParser::new();
        let mut images = 0u64;
        let mut finished = false;
        let mut read_error = None;

        while !interruption.is_requested() {
            match tail.next_line() {
                Ok(Some(line)) => forward(parser.feed(&line), sink, &mut images),
                Ok(None) => {
                    if finished {
                        if let Some(rest) = tail.take_remainder() {
                            forward(parser.feed(&rest), sink, &mut images);
                        }
                        break;
                    }
                    // one more read after exit picks up the final writes
                    finished = process.wait_timeout(self.timings.poll_interval);
                }
                Err(e) => {
                    log::error!("Failed to read classification data: {}", e);
                    read_error = Some(e);
                    break;
                }
            }
        }

        forward(parser.finish(), sink, &mut images);
        if parser.malformed_lines() > 0 {
            log::warn!("{} prediction lines could not be parsed", parser.malformed_lines());
        }
        (images, read_error)
    }

    fn terminate(&self, process: &mut SupervisedProcess) {
        process.kill(self.timings.kill_wait);
        if process.has_finished() {
            self.registry.mark_exited(process.id());
        }
    }
}

fn forward<S: ResultSink + ?Sized>(record: Option<ImageResult>, sink: &mut S, images: &mut u64) {
    if let Some(record) = record {
        *images += 1;
        sink.image_result(record);
    }
}

fn report<S: ResultSink + ?Sized>(sink: &mut S, error: WorkerError) {
    log::error!("{}", error);
    sink.error(error);
}

fn remove_stale_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed stale output file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
