//! Unified error type hierarchy for DNN Desktop
//!
//! Provides structured error handling with ConfigError, WorkerError and AppError.

use std::io;
use thiserror::Error;

/// Text appended to every run failure so the user can reproduce it by hand.
const MANUAL_RUN_HINT: &str = "Please, select the command below, copy it and run manually \
                               from command line to investigate the issue:";

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Unknown {kind}: {name}")]
    UnknownSelection { kind: &'static str, name: String },

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Failures of a classification run.
///
/// None of these abort the application. The worker reports them through
/// the result sink and then stops in an orderly way.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("CK executable name not found in config")]
    MissingExecutable,

    #[error("CK bin path not found in config")]
    MissingWorkingDirectory,

    #[error("Failed to start classification program: {reason}\n\n{command}")]
    SpawnFailed { command: String, reason: String },

    #[error("Classification program stopped prematurely. {}\n\n{command}", MANUAL_RUN_HINT)]
    PrematureExit { command: String },

    #[error(
        "Classification program startup takes too long (over {timeout_secs} s). {}\n\n{command}",
        MANUAL_RUN_HINT
    )]
    StartupTimeout { command: String, timeout_secs: f64 },

    #[error("IO error while reading classification data: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of a `WorkerError`, cheap to copy across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerErrorKind {
    MissingConfig,
    SpawnFailed,
    PrematureExit,
    StartupTimeout,
    Io,
}

impl WorkerError {
    pub fn kind(&self) -> WorkerErrorKind {
        match self {
            WorkerError::MissingExecutable | WorkerError::MissingWorkingDirectory => {
                WorkerErrorKind::MissingConfig
            }
            WorkerError::SpawnFailed { .. } => WorkerErrorKind::SpawnFailed,
            WorkerError::PrematureExit { .. } => WorkerErrorKind::PrematureExit,
            WorkerError::StartupTimeout { .. } => WorkerErrorKind::StartupTimeout,
            WorkerError::Io(_) => WorkerErrorKind::Io,
        }
    }
}

/// Global error type for front-end facing failures.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Settings persist or deserialize error
    #[error("Settings error: {0}")]
    Settings(String),

    /// Classification run failed
    #[error("Experiment error: {0}")]
    Experiment(String),

    /// Logging pipeline could not be set up
    #[error("Logging error: {0}")]
    Logging(String),

    /// File I/O error (read/write/delete)
    #[error("I/O error: {0}")]
    Io(String),
}

impl AppError {
    /// Get a user-facing error message suitable for UI display
    pub fn user_message(&self) -> String {
        match self {
            AppError::Settings(msg) => format!("Settings error: {}", msg),
            AppError::Experiment(msg) => msg.clone(),
            AppError::Logging(msg) => format!("Could not initialize logging: {}", msg),
            AppError::Io(msg) => format!("File operation failed: {}", msg),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Settings(e.to_string())
    }
}

impl From<WorkerError> for AppError {
    fn from(e: WorkerError) -> Self {
        AppError::Experiment(e.to_string())
    }
}

impl From<io::Error> for AppError {
    fn from(e: io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}
