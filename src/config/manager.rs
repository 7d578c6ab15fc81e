// Configuration Manager implementation for Brief Autopilot
//
// This module provides the ConfigManager that loads the engine configuration
// from the configuration directory and applies environment overrides.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tokio::fs as async_fs;

use super::types::{ConfigPaths, EngineConfig, EnvVars, RunnerMode, StoreBackend, ValidationResult};

/// Main configuration manager for Brief Autopilot
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// Effective configuration
    config: EngineConfig,
    /// Path to configuration directory
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a configuration manager for the default configuration directory
    pub async fn new() -> Result<Self> {
        let config_dir = Self::determine_config_dir()?;
        Self::with_config_dir(config_dir).await
    }

    /// Create a configuration manager for a specific directory
    pub async fn with_config_dir<P: Into<PathBuf>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.into();
        tracing::debug!("Using configuration directory: {:?}", config_dir);

        if !config_dir.exists() {
            async_fs::create_dir_all(&config_dir)
                .await
                .context("Failed to create configuration directory")?;
            tracing::info!("Created configuration directory: {:?}", config_dir);
        }

        let mut manager = Self {
            config: EngineConfig::default(),
            config_dir,
        };

        manager.load_config_file().await?;
        manager.apply_overrides(|key| env::var(key).ok());

        tracing::debug!("Configuration loaded");
        Ok(manager)
    }

    /// Determine the configuration directory to use
    fn determine_config_dir() -> Result<PathBuf> {
        if let Ok(config_dir) = env::var(EnvVars::CONFIG_DIR) {
            return Ok(PathBuf::from(config_dir));
        }

        ConfigPaths::default_config_dir()
    }

    /// Path of the configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(ConfigPaths::CONFIG_FILE)
    }

    /// Load the configuration file if it exists
    async fn load_config_file(&mut self) -> Result<()> {
        let config_file = self.config_file();

        if !config_file.exists() {
            tracing::debug!("Configuration file not found, using defaults");
            return Ok(());
        }

        tracing::debug!("Loading configuration from: {:?}", config_file);

        let content = async_fs::read_to_string(&config_file)
            .await
            .context("Failed to read configuration file")?;

        self.config = toml::from_str(&content).context("Failed to parse configuration file")?;
        Ok(())
    }

    /// Apply overrides looked up by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup(EnvVars::STORE) {
            match backend.parse::<StoreBackend>() {
                Ok(backend) => self.config.store.backend = backend,
                Err(e) => tracing::warn!("Ignoring {}: {}", EnvVars::STORE, e),
            }
        }

        if let Some(state_file) = lookup(EnvVars::STATE_FILE) {
            self.config.store.state_file = PathBuf::from(state_file);
        }

        if let Some(mode) = lookup(EnvVars::RUNNER) {
            match mode.parse::<RunnerMode>() {
                Ok(mode) => self.config.runner.mode = mode,
                Err(e) => tracing::warn!("Ignoring {}: {}", EnvVars::RUNNER, e),
            }
        }

        if let Some(endpoint) = lookup(EnvVars::RUNNER_ENDPOINT) {
            self.config.runner.endpoint = endpoint;
        }

        if let Some(api_key) = lookup(EnvVars::API_KEY) {
            self.config.runner.api_key = Some(api_key);
            tracing::debug!("Loaded audit service API key from environment");
        }

        if let Some(log_level) = lookup(EnvVars::LOG_LEVEL) {
            if let Ok(level) = log_level.parse() {
                self.config.log_level = level;
            }
        }
    }

    /// Get the effective configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get mutable access to the configuration
    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    /// Validate the current configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        let runner = &self.config.runner;

        if runner.mode == RunnerMode::Http {
            if !(runner.endpoint.starts_with("http://") || runner.endpoint.starts_with("https://")) {
                result.add_error(format!("Invalid audit service endpoint: {:?}", runner.endpoint));
            }
            if runner.api_key.is_none() {
                result.add_warning(format!(
                    "No audit service API key set ({})",
                    EnvVars::API_KEY
                ));
            }
        }

        if self.config.autopilot.audit_timeout.is_zero() {
            result.add_error("autopilot.audit_timeout must be greater than 0".to_string());
        } else if runner.request_timeout > self.config.autopilot.audit_timeout {
            result.add_warning(
                "runner.request_timeout exceeds autopilot.audit_timeout; slow requests will be cut off"
                    .to_string(),
            );
        }

        if self.config.store.backend == StoreBackend::File
            && self.config.store.state_file.as_os_str().is_empty()
        {
            result.add_error("store.state_file must be set for the file backend".to_string());
        }

        result
    }

    /// Save the current configuration to the configuration file
    pub async fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(&self.config)
            .context("Failed to serialize configuration")?;
        async_fs::write(self.config_file(), content)
            .await
            .context("Failed to write configuration file")?;

        tracing::info!("Configuration saved to {:?}", self.config_file());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join("brief-autopilot");

        let manager = ConfigManager::with_config_dir(&config_dir).await.unwrap();
        assert!(config_dir.exists());
        assert!(manager.config_file().ends_with("config.toml"));
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();

        let mut manager = ConfigManager::with_config_dir(temp_dir.path()).await.unwrap();
        manager.config_mut().store.backend = StoreBackend::Memory;
        manager.config_mut().autopilot.audit_timeout = Duration::from_secs(60);
        manager.save().await.unwrap();

        let reloaded = ConfigManager::with_config_dir(temp_dir.path()).await.unwrap();
        assert_eq!(reloaded.config().autopilot.audit_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_invalid_config_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("config.toml"), "store = 5").unwrap();

        assert!(ConfigManager::with_config_dir(temp_dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::with_config_dir(temp_dir.path()).await.unwrap();

        let vars: HashMap<&str, &str> = [
            (EnvVars::STORE, "memory"),
            (EnvVars::RUNNER, "http"),
            (EnvVars::RUNNER_ENDPOINT, "https://audits.example.com/v1"),
            (EnvVars::API_KEY, "test-key"),
            (EnvVars::LOG_LEVEL, "TRACE"),
        ]
        .into_iter()
        .collect();
        manager.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        let config = manager.config();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.runner.mode, RunnerMode::Http);
        assert_eq!(config.runner.endpoint, "https://audits.example.com/v1");
        assert_eq!(config.runner.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.log_level, crate::config::LogLevel::Trace);
        assert!(manager.validate().is_valid);
    }

    #[tokio::test]
    async fn test_validation() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::with_config_dir(temp_dir.path()).await.unwrap();
        manager.config_mut().runner.mode = RunnerMode::Http;
        manager.config_mut().runner.endpoint = "audits.example.com".to_string();
        manager.config_mut().runner.api_key = None;
        manager.config_mut().autopilot.audit_timeout = Duration::ZERO;

        let result = manager.validate();
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.warnings.len(), 1);
    }
}
