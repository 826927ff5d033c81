//! Process supervision for the CK tool.
//!
//! The tool runs under `tokio::process` on a current-thread runtime owned by
//! the supervising thread. Every wait is bounded, so the worker loop keeps
//! checking for interruption between waits.

use crate::error::WorkerError;
use crate::models::{Dataset, Model, Program};
use crate::system::registry::kill_group;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::runtime::Runtime;

/// Fully resolved invocation of the CK tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationCommand {
    pub exe: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl ClassificationCommand {
    pub fn new(
        exe: impl Into<String>,
        working_dir: Option<PathBuf>,
        program: &Program,
        model: &Model,
        dataset: &Dataset,
        batch_size: u32,
    ) -> Self {
        ClassificationCommand {
            exe: exe.into(),
            args: build_args(program, model, dataset, batch_size),
            working_dir,
        }
    }

    /// The command line a user can paste into a shell to reproduce the run.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.exe.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }

    /// Start the tool. Output is discarded: results arrive through the
    /// program's output file, not through the pipes.
    ///
    /// On unix the tool leads a new process group, so the classifier it
    /// launches can be killed together with it.
    pub fn spawn(&self) -> Result<SupervisedProcess, WorkerError> {
        let spawn_failed = |reason: String| WorkerError::SpawnFailed {
            command: self.command_line(),
            reason,
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| spawn_failed(format!("Failed to start process runtime: {}", e)))?;

        let mut command = Command::new(&self.exe);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        // the child's reaper registers with the runtime it is spawned in
        let child = {
            let _guard = runtime.enter();
            command.spawn().map_err(|e| spawn_failed(e.to_string()))?
        };
        let pid = child
            .id()
            .ok_or_else(|| spawn_failed("process exited before its pid was known".to_string()))?;
        log::debug!("Started CK process pid={}", pid);

        Ok(SupervisedProcess {
            child,
            runtime,
            pid,
            status: None,
        })
    }
}

/// Argument list understood by `ck run`.
pub fn build_args(program: &Program, model: &Model, dataset: &Dataset, batch_size: u32) -> Vec<String> {
    vec![
        "run".to_string(),
        format!("program:{}", program.uoa),
        "--cmd_key=use_continuous".to_string(),
        format!("--deps.caffemodel={}", model.uoa),
        format!("--deps.imagenet-aux={}", dataset.aux_uoa),
        format!("--deps.imagenet-val={}", dataset.val_uoa),
        format!("--env.CK_CAFFE_BATCH_SIZE={}", batch_size),
    ]
}

/// A started child owned by exactly one worker.
pub struct SupervisedProcess {
    // dropped before the runtime it was spawned on
    child: Child,
    runtime: Runtime,
    pid: u32,
    status: Option<ExitStatus>,
}

impl SupervisedProcess {
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Exit status if the process has already finished.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        if self.status.is_none() {
            let _guard = self.runtime.enter();
            match self.child.try_wait() {
                Ok(status) => self.status = status,
                Err(e) => log::warn!("Failed to query CK process status: {}", e),
            }
        }
        self.status
    }

    pub fn has_finished(&mut self) -> bool {
        self.try_status().is_some()
    }

    /// Wait up to `timeout` for the process to exit. Returns true if it has.
    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        if self.status.is_some() {
            return true;
        }
        let child = &mut self.child;
        match self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, child.wait()).await })
        {
            Ok(Ok(status)) => {
                self.status = Some(status);
                true
            }
            Ok(Err(e)) => {
                log::warn!("Failed to wait for CK process {}: {}", self.pid, e);
                false
            }
            Err(_elapsed) => false,
        }
    }

    /// Kill the process and its group, then wait up to `grace` for it to
    /// disappear.
    pub fn kill(&mut self, grace: Duration) -> bool {
        if self.has_finished() {
            return true;
        }
        if let Err(e) = self.child.start_kill() {
            log::warn!("Failed to kill CK process {}: {}", self.pid, e);
        }
        kill_group(self.pid);

        let gone = self.wait_timeout(grace);
        if !gone {
            log::warn!("CK process {} still running {:?} after kill", self.pid, grace);
        }
        gone
    }
}
