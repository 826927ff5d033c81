//! Settings discovery messages reach the log files once logging is up.
//!
//! Installs the global logger, so this file holds a single test.

use dnn_desktop::{LogCollector, SettingsManager};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_settings_fallback_warning_is_logged() {
    let dir = TempDir::new().unwrap();
    let broken = dir.path().join("settings.json");
    fs::write(&broken, "{ \"batch_size\": ").unwrap();

    // discovery happens before any logger exists
    let settings = SettingsManager::discover(&[broken]);

    let logs = dir.path().join("logs");
    let (ui_tx, _ui_rx) = tokio::sync::mpsc::channel(16);
    let collector = Arc::new(LogCollector::new(logs, ui_tx).unwrap());
    collector.clone().init_global_logger(log::LevelFilter::Info).unwrap();
    let session = collector.start_new_session("startup.log").unwrap();

    settings.log_source();
    collector.flush_blocking().unwrap();

    let content = fs::read_to_string(&session).unwrap();
    assert!(content.contains("[WARN] Failed to load"), "log was: {}", content);
    assert!(content.contains("falling back to defaults"));
}
