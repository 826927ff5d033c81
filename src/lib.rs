//! DNN Desktop
//!
//! Runs a CK image classification program as a child process, follows the
//! per-image results it writes, and turns them into live throughput and
//! accuracy metrics.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and metric aggregation
//! - **config**: Settings and the program/model/dataset catalog
//! - **system**: Child process registry and logging macros
//! - **log_collector**: Disk-persisted logging with a log window feed
//! - **worker**: Process supervision, output polling and line protocol parsing
//! - **ui**: Result delivery, experiment control and text panels

// Core foundational modules
pub mod error;
pub mod models;

pub mod config;
pub mod system;
pub mod log_collector;
pub mod worker;
pub mod ui;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{AppError, ConfigError, WorkerError, WorkerErrorKind};

pub use models::{
    Dataset, ExperimentResult, ImageResult, Model, PredictionResult, Program, WorstPrediction,
};

pub use config::{AppConfig, LoadedSettings, SettingsManager, SettingsSource};

pub use system::{global_registry, ProcessRegistry};

pub use worker::{ClassificationWorker, Interruption, RunOutcome, WorkerTimings};

pub use ui::{ExperimentContext, ExperimentEvent, ResultSink, ResultsPanel, WorkerBridge, WorkerEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_error_reexport() {
        let err: AppError = ConfigError::ValidationFailed("batch_size must be positive".to_string()).into();
        assert!(err.user_message().starts_with("Settings error:"));
    }

    #[test]
    fn test_models_reexport() {
        assert!(ImageResult::default().is_empty());
        assert_eq!(ExperimentResult::default().images_count, 0);
    }
}
