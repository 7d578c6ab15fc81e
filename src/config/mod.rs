// Configuration module for Brief Autopilot
//
// This module loads the engine configuration from a TOML file and
// environment overrides.

pub mod manager;
pub mod types;

// Re-export commonly used types
pub use manager::ConfigManager;
pub use types::{
    AutopilotConfig, EngineConfig, LogLevel, RunnerConfig, RunnerMode, StoreBackend, StoreConfig,
    ValidationResult,
};
