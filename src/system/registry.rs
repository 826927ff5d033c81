//! Child process registry.
//!
//! The CK tool does not classify images itself: it launches the program's
//! classifier binary as a grandchild. Killing the tool alone can leave that
//! binary running, so every run registers both the tool's pid and the
//! classifier's executable name here. `kill_all()` reaches both.
//!
//! Entries are append-only. A pid is signalled at most once, so a recycled
//! pid is never hit by a later `kill_all()`.
//!
//! Names are matched against the full command line (`pkill -f`), anchored on
//! the executable: the kernel's short process name is cut at 15 bytes and
//! would miss longer classifier names.

use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

static GLOBAL_REGISTRY: Lazy<Arc<ProcessRegistry>> =
    Lazy::new(|| Arc::new(ProcessRegistry::new()));

/// Process-wide registry shared by all workers that were not given their own.
pub fn global_registry() -> Arc<ProcessRegistry> {
    Arc::clone(&GLOBAL_REGISTRY)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisteredProcess {
    /// A process we started ourselves. `signalled` is also set once the
    /// owner has reaped it.
    Pid { pid: u32, signalled: bool },
    /// Any process whose executable has this file name
    Name(String),
}

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Mutex<Vec<RegisteredProcess>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pid(&self, pid: u32) {
        self.push(RegisteredProcess::Pid {
            pid,
            signalled: false,
        });
    }

    /// Register an executable name. Blank names are ignored.
    pub fn register_name(&self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.push(RegisteredProcess::Name(name.to_string()));
        }
    }

    /// Mark a pid as reaped so `kill_all()` leaves it alone.
    pub fn mark_exited(&self, exited: u32) {
        if let Ok(mut entries) = self.entries.lock() {
            for entry in entries.iter_mut() {
                if let RegisteredProcess::Pid { pid, signalled } = entry {
                    if *pid == exited {
                        *signalled = true;
                    }
                }
            }
        }
    }

    fn push(&self, entry: RegisteredProcess) {
        log::debug!("Registering child process {:?}", entry);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Snapshot of everything registered so far.
    pub fn entries(&self) -> Vec<RegisteredProcess> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// SIGKILL every registered pid and its process group (once) and every
    /// registered name.
    pub fn kill_all(&self) {
        let mut pids = Vec::new();
        let mut names = Vec::new();
        match self.entries.lock() {
            Ok(mut entries) => {
                for entry in entries.iter_mut() {
                    match entry {
                        RegisteredProcess::Pid { pid, signalled } if !*signalled => {
                            *signalled = true;
                            pids.push(*pid);
                        }
                        RegisteredProcess::Pid { .. } => {}
                        RegisteredProcess::Name(name) => {
                            if !names.contains(name) {
                                names.push(name.clone());
                            }
                        }
                    }
                }
            }
            Err(_) => return,
        }

        for pid in pids {
            kill_pid(pid);
        }
        for name in names {
            kill_by_name(&name);
        }
    }
}

#[cfg(unix)]
fn kill_pid(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => log::debug!("Sent SIGKILL to pid {}", pid),
        // ESRCH: already gone, the usual case after a clean exit
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => log::warn!("Failed to kill pid {}: {}", pid, e),
    }
    // the CK tool leads its own group; other pids have no group of that id
    kill_group(pid);
}

#[cfg(not(unix))]
fn kill_pid(pid: u32) {
    log::warn!("Killing pid {} is not supported on this platform", pid);
}

/// SIGKILL the process group led by `pgid`.
#[cfg(unix)]
pub fn kill_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) => log::debug!("Sent SIGKILL to process group {}", pgid),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => log::warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

#[cfg(not(unix))]
pub fn kill_group(_pgid: u32) {}

/// Extended regex matching a command line whose first word is `name`, bare
/// or with any directory in front.
fn command_pattern(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() * 2);
    for c in name.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("^([^ ]*/)?{}( |$)", escaped)
}

#[cfg(unix)]
fn kill_by_name(name: &str) {
    match std::process::Command::new("pkill")
        .arg("-9")
        .arg("-f")
        .arg(command_pattern(name))
        .output()
    {
        Ok(out) if out.status.success() => log::debug!("Killed processes named '{}'", name),
        // pkill exits 1 when nothing matched
        Ok(_) => {}
        Err(e) => log::warn!("Failed to run pkill for '{}': {}", name, e),
    }
}

#[cfg(not(unix))]
fn kill_by_name(name: &str) {
    log::warn!("Killing '{}' by name is not supported on this platform", name);
}
