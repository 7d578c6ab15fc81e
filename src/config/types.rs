// Configuration types for Brief Autopilot
//
// This module defines the engine configuration: which project store and audit
// runner to use, autopilot tunables, and logging.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::serde_helpers::duration_secs;

/// Log level for the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Project store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Volatile demo store
    Memory,
    /// JSON state file
    File,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "demo" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

/// Project store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// State file used by the file backend
    pub state_file: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            state_file: ConfigPaths::default_state_file(),
        }
    }
}

/// Audit runner implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerMode {
    /// Deterministic local results
    Demo,
    /// Hosted generative analysis service
    Http,
}

impl std::str::FromStr for RunnerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "demo" => Ok(RunnerMode::Demo),
            "http" => Ok(RunnerMode::Http),
            _ => Err(format!("Invalid runner mode: {}", s)),
        }
    }
}

/// Audit runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub mode: RunnerMode,
    /// Endpoint of the analysis service
    pub endpoint: String,
    /// Bearer token; read from the environment, never written back
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model name forwarded to the service
    pub model: String,
    /// HTTP request timeout
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            mode: RunnerMode::Demo,
            endpoint: "http://localhost:8787/v1/audits".to_string(),
            api_key: None,
            model: "analysis-default".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Autopilot tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    /// Global autopilot state until it is toggled and stored
    pub global_enabled: bool,
    /// Upper bound for one audit step
    #[serde(with = "duration_secs")]
    pub audit_timeout: Duration,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            global_enabled: true,
            audit_timeout: Duration::from_secs(300),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub log_level: LogLevel,
    pub store: StoreConfig,
    pub runner: RunnerConfig,
    pub autopilot: AutopilotConfig,
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Whether the configuration is valid
    pub is_valid: bool,
    /// Validation errors
    pub errors: Vec<String>,
    /// Validation warnings
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Create a new validation result
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error to the validation result
    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    /// Add a warning to the validation result
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Check if there are any issues
    pub fn has_issues(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Environment variable names
pub struct EnvVars;

impl EnvVars {
    pub const CONFIG_DIR: &'static str = "BRIEF_AUTOPILOT_CONFIG_DIR";
    pub const STORE: &'static str = "BRIEF_AUTOPILOT_STORE";
    pub const STATE_FILE: &'static str = "BRIEF_AUTOPILOT_STATE_FILE";
    pub const RUNNER: &'static str = "BRIEF_AUTOPILOT_RUNNER";
    pub const RUNNER_ENDPOINT: &'static str = "BRIEF_AUTOPILOT_RUNNER_ENDPOINT";
    pub const API_KEY: &'static str = "BRIEF_AUTOPILOT_API_KEY";
    pub const LOG_LEVEL: &'static str = "BRIEF_AUTOPILOT_LOG_LEVEL";
}

/// Configuration file paths and names
pub struct ConfigPaths;

impl ConfigPaths {
    /// Application directory name
    pub const APP_DIR_NAME: &'static str = "brief-autopilot";

    /// Configuration file name
    pub const CONFIG_FILE: &'static str = "config.toml";

    /// Project state file name
    pub const STATE_FILE: &'static str = "projects.json";

    /// Get the default configuration directory
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(Self::APP_DIR_NAME))
            .context("Failed to determine configuration directory")
    }

    /// Get the default project state file
    pub fn default_state_file() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_DIR_NAME)
            .join(Self::STATE_FILE)
    }
}
