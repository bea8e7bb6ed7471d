//! Read-only configuration for WinScout

pub mod parser;
pub mod validator;

pub use parser::{
    ActivationSection, CacheSection, ConfigParseError, ConfigParser, DiagnosticsSection,
    DiscoverySection, ScoutConfig,
};
pub use validator::{ConfigValidator, ValidationResult, ValidationSeverity};

use crate::{Result, ScoutError};
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "WINSCOUT_CONFIG";

/// `~/.config/winscout`
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("winscout")
}

/// Config file location, honouring `WINSCOUT_CONFIG`
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join("config.toml"))
}

/// Load the config from its default location; a missing file means defaults
pub fn load() -> Result<ScoutConfig> {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> Result<ScoutConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(ScoutConfig::default());
    }

    let mut parser = ConfigParser::new();
    let config = parser
        .parse_file(path)
        .map_err(|err| ScoutError::Configuration(err.to_string()))
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    for warning in parser.get_warnings() {
        warn!(path = %path.display(), "{}", warning);
    }

    validate(&config)?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Reject configurations with any error-level finding; log the warnings
pub fn validate(config: &ScoutConfig) -> Result<()> {
    let results = ConfigValidator::new().validate_full_config(config);
    let mut errors = Vec::new();

    for result in results {
        match result.severity {
            ValidationSeverity::Error => {
                errors.push(format!("{}: {}", result.field, result.message))
            }
            ValidationSeverity::Warning => {
                warn!(field = result.field, "{}", result.message)
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ScoutError::Validation(errors.join("; ")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn missing_file_means_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ScoutConfig::default());
    }

    #[test]
    fn file_values_are_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[activation]\nmax_concurrent = 2\n").unwrap();
        writeln!(file, "[diagnostics]\ndump_dir = \"/tmp/winscout-dumps\"").unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.activation.max_concurrent, 2);
        assert_eq!(
            config.diagnostics.dump_dir(),
            PathBuf::from("/tmp/winscout-dumps")
        );
    }

    #[test]
    fn invalid_file_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache\nttl_ms = ").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScoutError>(),
            Some(ScoutError::Configuration(_))
        ));
    }

    #[test]
    fn validation_collects_every_error() {
        let mut config = ScoutConfig::default();
        config.cache.ttl_ms = 0;
        config.activation.max_concurrent = 0;

        let message = validate(&config).unwrap_err().to_string();
        assert!(message.contains("cache.ttl_ms"));
        assert!(message.contains("activation.max_concurrent"));
    }

    #[test]
    fn default_dump_dir_is_under_config_dir() {
        assert_eq!(
            DiagnosticsSection::default().dump_dir(),
            config_dir().join("debug")
        );
    }
}
