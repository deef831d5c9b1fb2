//! ekjit Driver Configuration
//!
//! Handles parsing and management of ekjit.toml configuration files.
//!
//! The optimization pipeline is not configurable; its passes and constants
//! live in [`crate::compile::PassPipeline::FIXED`].

use inkwell::OptimizationLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// File name searched for by [`DriverConfig::find_and_load`]
pub const CONFIG_FILE_NAME: &str = "ekjit.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching ekjit.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DriverConfig {
    /// Driver behaviour
    #[serde(default)]
    pub driver: DriverSettings,

    /// Execution engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DriverConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: DriverConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Driver behaviour flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverSettings {
    /// Run the fixed optimization pipeline by default
    #[serde(default)]
    pub optimize: bool,

    /// Log per-function and per-module pass change signals
    #[serde(default = "default_true")]
    pub log_pass_changes: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            optimize: false,
            log_pass_changes: true,
        }
    }
}

/// Execution engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Optimization level the code generator runs at
    #[serde(default)]
    pub codegen_opt_level: CodegenLevel,
}

/// Code generation optimization level
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodegenLevel {
    None,
    Less,
    #[default]
    Default,
    Aggressive,
}

impl From<CodegenLevel> for OptimizationLevel {
    fn from(level: CodegenLevel) -> Self {
        match level {
            CodegenLevel::None => OptimizationLevel::None,
            CodegenLevel::Less => OptimizationLevel::Less,
            CodegenLevel::Default => OptimizationLevel::Default,
            CodegenLevel::Aggressive => OptimizationLevel::Aggressive,
        }
    }
}
