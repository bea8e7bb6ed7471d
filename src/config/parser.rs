use crate::activation::DEFAULT_MAX_CONCURRENT;
use crate::cache::DEFAULT_TTL;
use crate::discovery::engine::{EngineSettings, DEFAULT_AX_BUDGET};
use crate::discovery::title_cache::DEFAULT_TITLE_CACHE_CAPACITY;
use crate::discovery::DiscoveryOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const KNOWN_SECTIONS: [&str; 4] = ["cache", "discovery", "activation", "diagnostics"];

#[derive(Error, Debug)]
pub enum ConfigParseError {
    #[error("File IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

/// Read-only tool configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub cache: CacheSection,
    pub discovery: DiscoverySection,
    pub activation: ActivationSection,
    pub diagnostics: DiagnosticsSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub ttl_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL.as_millis() as u64,
        }
    }
}

impl CacheSection {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Per-process accessibility enumeration budget
    pub ax_budget_ms: u64,
    pub auxiliary_min_width: u32,
    pub auxiliary_min_height: u32,
    pub title_cache_capacity: usize,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let options = DiscoveryOptions::default();
        Self {
            ax_budget_ms: DEFAULT_AX_BUDGET.as_millis() as u64,
            auxiliary_min_width: options.auxiliary_min_width,
            auxiliary_min_height: options.auxiliary_min_height,
            title_cache_capacity: DEFAULT_TITLE_CACHE_CAPACITY,
        }
    }
}

impl DiscoverySection {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            ax_budget: Duration::from_millis(self.ax_budget_ms),
            title_cache_capacity: self.title_cache_capacity,
        }
    }

    /// Copy the configured heuristic thresholds onto `options`
    pub fn apply_to(&self, options: &mut DiscoveryOptions) {
        options.auxiliary_min_width = self.auxiliary_min_width;
        options.auxiliary_min_height = self.auxiliary_min_height;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationSection {
    pub max_concurrent: usize,
}

impl Default for ActivationSection {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSection {
    pub dump_dir: Option<PathBuf>,
}

impl DiagnosticsSection {
    /// Configured dump directory, or `debug/` under the config directory
    pub fn dump_dir(&self) -> PathBuf {
        self.dump_dir
            .clone()
            .unwrap_or_else(|| super::config_dir().join("debug"))
    }
}

pub struct ConfigParser {
    warnings: Vec<String>,
}

impl Default for ConfigParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigParser {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<ScoutConfig, ConfigParseError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_str(&content)
    }

    pub fn parse_str(&mut self, content: &str) -> Result<ScoutConfig, ConfigParseError> {
        let raw: toml::Value = toml::from_str(content)?;
        if let Some(table) = raw.as_table() {
            for section in table.keys() {
                if !KNOWN_SECTIONS.contains(&section.as_str()) {
                    self.warnings
                        .push(format!("Ignoring unknown configuration section '{}'", section));
                }
            }
        }

        let config: ScoutConfig = toml::from_str(content)?;
        self.check_required(&config)?;
        Ok(config)
    }

    pub fn get_warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Values that would make the engine unusable are rejected outright
    fn check_required(&self, config: &ScoutConfig) -> Result<(), ConfigParseError> {
        if config.cache.ttl_ms == 0 {
            return Err(ConfigParseError::ValidationError {
                message: "cache.ttl_ms must be greater than zero".to_string(),
            });
        }
        if config.activation.max_concurrent == 0 {
            return Err(ConfigParseError::ValidationError {
                message: "activation.max_concurrent must be at least 1".to_string(),
            });
        }
        if config.discovery.title_cache_capacity == 0 {
            return Err(ConfigParseError::ValidationError {
                message: "discovery.title_cache_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
