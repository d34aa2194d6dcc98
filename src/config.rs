use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for clip-bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Background frame worker settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Frame streaming settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.worker.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

/// Frame worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of background threads decoding and packing frames
    pub threads: usize,

    /// Prefix for worker thread names
    pub thread_name_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            thread_name_prefix: "frame-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "worker.threads".to_string(),
                value: self.threads.to_string()
            }.into());
        }

        if self.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "worker.thread_name_prefix".to_string(),
                value: format!("{:?}", self.thread_name_prefix)
            }.into());
        }

        Ok(())
    }
}

/// Frame streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of frame requests outstanding at once
    pub max_in_flight: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_in_flight: 4 }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.max_in_flight".to_string(),
                value: self.max_in_flight.to_string()
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("clip_bridge.toml");

        let mut original_config = Config::default();
        original_config.worker.threads = 3;
        original_config.pipeline.max_in_flight = 7;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.worker.threads, 3);
        assert_eq!(loaded_config.worker.thread_name_prefix, "frame-worker");
        assert_eq!(loaded_config.pipeline.max_in_flight, 7);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[pipeline]\nmax_in_flight = 2\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.pipeline.max_in_flight, 2);
        assert_eq!(config.worker.threads, num_cpus::get());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::from_file(dir.path().join("nope.toml"));
        assert!(matches!(
            result,
            Err(crate::BridgeError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_invalid_worker_threads() {
        let mut config = Config::default();
        config.worker.threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_max_in_flight() {
        let mut config = Config::default();
        config.pipeline.max_in_flight = 0;
        assert!(config.validate().is_err());
    }
}
