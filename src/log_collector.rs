//! Decoupled logging pipeline for classification experiments.
//!
//! # Architecture
//!
//! ```text
//! log::info!() / log::warn!() ...
//!     |
//! [LogCollector] (implements log::Log, never blocks)
//!     | (crossbeam unbounded channel)
//!     v
//! [persister thread] ──> logs/full/<session>.log      (every line)
//!     |              ──> logs/parsed/<ts>_parsed.log  (target "parsed" only)
//!     v
//! log window channel (tokio mpsc, try_send, dropped when full)
//! ```
//!
//! Disk writes never depend on the log window keeping up.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Log, Metadata, Record};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Internal log line or special marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// Session state with generation tracking for detecting session changes
#[derive(Clone, Debug)]
struct SessionState {
    path: Option<PathBuf>,
    /// Incremented when the session changes so the persister reopens files
    generation: u64,
}

/// Resolve the log directory; relative paths are taken from the current directory.
pub fn resolve_logs_path(log_dir: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(log_dir);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Failed to get current working directory: {}", e))?;
    Ok(cwd.join(path))
}

/// A log line with metadata
#[derive(Clone, Debug, PartialEq)]
pub struct LogLine {
    pub message: String,
    /// Log type: "full" or "parsed"
    pub log_type: String,
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            log_type: "full".to_string(),
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            log_type: "parsed".to_string(),
            ..LogLine::new(message)
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.log_type == "parsed"
    }
}

/// Unified logger that handles disk and log window dispatch
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_dir: PathBuf,
    session_state: Arc<Mutex<SessionState>>,
    max_level: log::LevelFilter,
}

impl LogCollector {
    /// Create the log directories and start the persister thread.
    pub fn new(
        log_dir: PathBuf,
        ui_tx: tokio::sync::mpsc::Sender<LogLine>,
    ) -> Result<Self, String> {
        let full_log_dir = log_dir.join("full");
        let parsed_log_dir = log_dir.join("parsed");
        std::fs::create_dir_all(&full_log_dir)
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(&parsed_log_dir)
            .map_err(|e| format!("Failed to create parsed log dir: {}", e))?;

        let (tx, rx) = unbounded::<LogMessage>();

        let session_state = Arc::new(Mutex::new(SessionState {
            path: None,
            generation: 0,
        }));
        let session_state_clone = Arc::clone(&session_state);

        // Plain thread, not a tokio task: the worker logs from outside any runtime
        std::thread::Builder::new()
            .name("log-persister".to_string())
            .spawn(move || {
                let mut file_handles: HashMap<&'static str, File> = HashMap::new();
                let mut last_generation: u64 = 0;

                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => {
                            let session = session_state_clone.lock().ok().map(|s| s.clone());
                            if let Some(session) = &session {
                                if session.generation != last_generation {
                                    file_handles.remove("full");
                                    last_generation = session.generation;
                                }
                            }

                            if !file_handles.contains_key("full") {
                                let path = match session.and_then(|s| s.path) {
                                    Some(path) => Some(path),
                                    None => new_log_path(&full_log_dir, "full").ok(),
                                };
                                if let Some(file) = path.and_then(|p| open_append(&p)) {
                                    file_handles.insert("full", file);
                                }
                            }

                            let formatted = format!("[{}] {}\n", line.timestamp, line.message);
                            if let Some(file) = file_handles.get_mut("full") {
                                let _ = file.write_all(formatted.as_bytes());
                            }

                            if line.is_parsed() {
                                if !file_handles.contains_key("parsed") {
                                    if let Some(file) = new_log_path(&parsed_log_dir, "parsed")
                                        .ok()
                                        .and_then(|p| open_append(&p))
                                    {
                                        file_handles.insert("parsed", file);
                                    }
                                }
                                if let Some(file) = file_handles.get_mut("parsed") {
                                    let _ = file.write_all(formatted.as_bytes());
                                }
                            }

                            // Log window is best effort
                            let _ = ui_tx.try_send(line);
                        }
                        LogMessage::Flush(ack) => {
                            for file in file_handles.values_mut() {
                                let _ = file.flush();
                                let _ = file.sync_data();
                            }
                            let _ = ack.send(());
                        }
                    }
                }
            })
            .map_err(|e| format!("Failed to start log persister: {}", e))?;

        Ok(LogCollector {
            tx,
            log_dir,
            session_state,
            max_level: log::LevelFilter::Info,
        })
    }

    /// Register as the global `log` backend.
    pub fn init_global_logger(self: Arc<Self>, level: log::LevelFilter) -> Result<(), String> {
        let mut collector = (*self).clone();
        collector.max_level = level;
        log::set_boxed_logger(Box::new(collector))
            .map(|()| log::set_max_level(level))
            .map_err(|e| format!("Failed to set global logger: {}", e))
    }

    /// Direct subsequent lines to a dedicated file under `logs/full/`.
    pub fn start_new_session(&self, filename: &str) -> Result<PathBuf, String> {
        let log_path = self.log_dir.join("full").join(filename);

        let mut session = self
            .session_state
            .lock()
            .map_err(|e| format!("Failed to lock session state: {}", e))?;
        session.path = Some(log_path.clone());
        session.generation = session.generation.wrapping_add(1);

        Ok(log_path)
    }

    pub fn get_session_log_path(&self) -> Option<PathBuf> {
        self.session_state
            .lock()
            .ok()
            .and_then(|session| session.path.clone())
    }

    /// Send a log line (non-blocking)
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    pub fn log_str(&self, message: impl Into<String>) {
        self.log_line(LogLine::new(message.into()));
    }

    /// Send a parsed (high-level) log
    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log_line(LogLine::parsed(message.into()));
    }

    /// Wait until every line sent before this call is on disk. The wait
    /// itself runs on tokio's blocking pool.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let collector = self.clone();
        tokio::task::spawn_blocking(move || collector.flush_blocking())
            .await
            .map_err(|e| format!("Flush task failed: {}", e))?
    }

    /// Synchronous variant of `wait_for_empty` for non-async callers.
    pub fn flush_blocking(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

impl Clone for LogCollector {
    fn clone(&self) -> Self {
        LogCollector {
            tx: self.tx.clone(),
            log_dir: self.log_dir.clone(),
            session_state: Arc::clone(&self.session_state),
            max_level: self.max_level,
        }
    }
}

/// Wires all log::info!(), log::warn!(), log::error!() calls into LogCollector
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = format!("[{}] {}", record.level(), record.args());
        if record.target() == "parsed" {
            self.log_parsed(message);
        } else {
            self.log_str(message);
        }
    }

    fn flush(&self) {
        let _ = self.flush_blocking();
    }
}

fn open_append(path: &Path) -> Option<File> {
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Fresh timestamped file name in `dir`.
fn new_log_path(dir: &Path, kind: &str) -> Result<PathBuf, String> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.log", timestamp, kind));
    File::create(&path).map_err(|e| format!("Failed to create log file: {}", e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_log_collector_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let (ui_tx, _ui_rx) = tokio::sync::mpsc::channel(100);
        let result = LogCollector::new(temp_dir.path().to_path_buf(), ui_tx);

        assert!(result.is_ok());
        assert!(temp_dir.path().join("full").exists());
        assert!(temp_dir.path().join("parsed").exists());
    }

    #[test]
    fn test_session_file_receives_lines() {
        let temp_dir = TempDir::new().unwrap();
        let (ui_tx, mut ui_rx) = tokio::sync::mpsc::channel(100);
        let collector = LogCollector::new(temp_dir.path().to_path_buf(), ui_tx).unwrap();

        let session = collector.start_new_session("run.log").unwrap();
        collector.log_str("first line");
        collector.log_parsed("milestone");
        collector.flush_blocking().unwrap();

        let content = fs::read_to_string(&session).unwrap();
        assert!(content.contains("first line"));
        assert!(content.contains("milestone"));
        assert_eq!(collector.get_session_log_path(), Some(session));

        let parsed: Vec<_> = fs::read_dir(temp_dir.path().join("parsed"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(parsed.len(), 1);

        // the log window saw both lines
        assert_eq!(ui_rx.try_recv().unwrap().message, "first line");
        assert!(ui_rx.try_recv().unwrap().is_parsed());
    }

    #[test]
    fn test_full_log_window_does_not_block() {
        let temp_dir = TempDir::new().unwrap();
        let (ui_tx, _ui_rx) = tokio::sync::mpsc::channel(1);
        let collector = LogCollector::new(temp_dir.path().to_path_buf(), ui_tx).unwrap();

        for i in 0..500 {
            collector.log_str(format!("Log message {}", i));
        }
        collector.flush_blocking().unwrap();

        let full_logs = temp_dir.path().join("full");
        let file = fs::read_dir(&full_logs).unwrap().next().unwrap().unwrap();
        let content = fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("Log message 499"));
    }

    #[tokio::test]
    async fn test_wait_for_empty_flushes_from_async_context() {
        let temp_dir = TempDir::new().unwrap();
        let (ui_tx, _ui_rx) = tokio::sync::mpsc::channel(100);
        let collector = LogCollector::new(temp_dir.path().to_path_buf(), ui_tx).unwrap();
        let session = collector.start_new_session("flush.log").unwrap();
        collector.log_str("before flush");

        collector.wait_for_empty().await.unwrap();

        assert!(fs::read_to_string(&session).unwrap().contains("before flush"));
    }

    #[test]
    fn test_resolve_logs_path() {
        assert_eq!(resolve_logs_path("/var/log/x").unwrap(), PathBuf::from("/var/log/x"));
        assert!(resolve_logs_path("logs").unwrap().is_absolute());
    }
}
