//! Configuration module for classification experiments.
//!
//! # Settings Management
//!
//! `AppConfig` holds everything the worker needs from outside: where the CK
//! tool lives, how long to wait for it, and the catalog of programs, models
//! and datasets that can be combined into an experiment. `SettingsManager`
//! resolves which settings file to use and falls back to defaults when
//! nothing usable is found.

use crate::error::ConfigError;
use crate::models::{Dataset, Model, Program};
use std::fs;
use std::path::{Path, PathBuf};

/// Local settings file, checked before the per-user one.
pub const LOCAL_SETTINGS_PATH: &str = "config/settings.json";
const USER_SETTINGS_DIR: &str = "dnn-desktop";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Application configuration
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Executable of the CK tool (name on PATH or absolute path)
    pub ck_exe_name: String,
    /// Working directory the tool is started from
    pub ck_bin_path: String,
    /// How long the classifier may take to produce its output file
    pub classification_startup_timeout_seconds: u64,
    pub batch_size: u32,
    /// Directory for persisted logs
    pub log_dir: String,

    pub programs: Vec<Program>,
    pub models: Vec<Model>,
    pub datasets: Vec<Dataset>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            ck_exe_name: "ck".to_string(),
            ck_bin_path: String::new(),
            classification_startup_timeout_seconds: 20,
            batch_size: 1,
            log_dir: "logs".to_string(),
            programs: Vec::new(),
            models: Vec::new(),
            datasets: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Executable name, `None` when unset.
    pub fn ck_exe(&self) -> Option<&str> {
        non_empty(&self.ck_exe_name)
    }

    /// Working directory, `None` when unset.
    pub fn ck_bin_dir(&self) -> Option<&Path> {
        non_empty(&self.ck_bin_path).map(Path::new)
    }

    /// Resolve a program's output file. Relative paths are taken relative to
    /// the tool's working directory, since that is where the tool runs.
    pub fn resolve_output_file(&self, program: &Program) -> PathBuf {
        let path = PathBuf::from(&program.output_file);
        match self.ck_bin_dir() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        }
    }

    pub fn find_program(&self, name: &str) -> Result<&Program, ConfigError> {
        self.programs
            .iter()
            .find(|p| p.uoa == name || p.title == name)
            .ok_or_else(|| ConfigError::UnknownSelection {
                kind: "program",
                name: name.to_string(),
            })
    }

    pub fn find_model(&self, name: &str) -> Result<&Model, ConfigError> {
        self.models
            .iter()
            .find(|m| m.uoa == name || m.title == name)
            .ok_or_else(|| ConfigError::UnknownSelection {
                kind: "model",
                name: name.to_string(),
            })
    }

    pub fn find_dataset(&self, name: &str) -> Result<&Dataset, ConfigError> {
        self.datasets
            .iter()
            .find(|d| d.val_uoa == name || d.title == name)
            .ok_or_else(|| ConfigError::UnknownSelection {
                kind: "dataset",
                name: name.to_string(),
            })
    }

    /// Basic sanity checks before starting an experiment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.classification_startup_timeout_seconds == 0 {
            return Err(ConfigError::ValidationFailed(
                "classification_startup_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be positive".to_string(),
            ));
        }
        if let Some(p) = self.programs.iter().find(|p| p.output_file.is_empty()) {
            return Err(ConfigError::ValidationFailed(format!(
                "program '{}' has no output_file",
                p.uoa
            )));
        }
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsSource {
    File(PathBuf),
    /// No settings file was found
    Defaults,
    /// The first settings file found was unusable; defaults were used instead
    Fallback { path: PathBuf, reason: String },
}

/// Result of settings discovery.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub config: AppConfig,
    pub source: SettingsSource,
}

impl LoadedSettings {
    /// Report the source through `log`. Settings are loaded before the log
    /// directory is known, so this runs once the logger is installed.
    pub fn log_source(&self) {
        match &self.source {
            SettingsSource::File(path) => log::info!("Loaded settings from {}", path.display()),
            SettingsSource::Defaults => log::info!("No settings file found, using defaults"),
            SettingsSource::Fallback { path, reason } => log::warn!(
                "Failed to load {}, falling back to defaults: {}",
                path.display(),
                reason
            ),
        }
    }
}

/// Settings file discovery: explicit path, then the local file, then the
/// per-user one.
pub struct SettingsManager;

impl SettingsManager {
    /// `~/.config/dnn-desktop/settings.json` (or the platform equivalent).
    pub fn user_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(USER_SETTINGS_DIR).join(SETTINGS_FILE_NAME))
    }

    /// Candidate files in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_SETTINGS_PATH)];
        paths.extend(Self::user_settings_path());
        paths
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist and parse. Otherwise the search paths are
    /// tried in order.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedSettings, ConfigError> {
        match explicit {
            Some(path) => Ok(LoadedSettings {
                config: Self::read(path)?,
                source: SettingsSource::File(path.to_path_buf()),
            }),
            None => Ok(Self::discover(&Self::search_paths())),
        }
    }

    /// Use the first existing candidate. A candidate that exists but cannot
    /// be read or parsed ends the search with defaults; later files are not
    /// consulted.
    pub fn discover(candidates: &[PathBuf]) -> LoadedSettings {
        let Some(path) = candidates.iter().find(|p| p.exists()) else {
            return LoadedSettings {
                config: AppConfig::default(),
                source: SettingsSource::Defaults,
            };
        };
        match Self::read(path) {
            Ok(config) => LoadedSettings {
                config,
                source: SettingsSource::File(path.clone()),
            },
            Err(e) => LoadedSettings {
                config: AppConfig::default(),
                source: SettingsSource::Fallback {
                    path: path.clone(),
                    reason: e.to_string(),
                },
            },
        }
    }

    /// Parse one settings file. Only `.json` files are accepted.
    pub fn read(path: &Path) -> Result<AppConfig, ConfigError> {
        if path.extension().map_or(true, |ext| ext != "json") {
            return Err(ConfigError::ValidationFailed(format!(
                "{} is not a .json file",
                path.display()
            )));
        }
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
            _ => ConfigError::IoError(e),
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}
