//! Configuration for the value runtime
//!
//! Settings live in a single TOML file:
//! - logging level and format
//! - default `to_simple_value` options
//! - conversion resolution policy
//! - growth policy of the reference heap engine
//!
//! Missing keys fall back to their defaults, so a partial file is valid.
//!
//! # Example
//!
//! ```ignore
//! use typelib_core::config::{config_path, CoreConfig};
//!
//! let config = CoreConfig::load(&config_path())?;
//! typelib_core::logging::init(&config.logging);
//! ```
//!
//! ```toml
//! version = 1
//!
//! [logging]
//! level = "debug"
//!
//! [simple_value]
//! pack_simple_arrays = true
//! special_float_values = "string"
//!
//! [conversions]
//! resolution = "first_match"
//!
//! [engine]
//! initial_capacity = 8
//! growth_factor = 1.5
//! max_block_size = 268435456
//! ```

mod loader;

use std::path::Path;

use serde::{Deserialize, Serialize};
use typelib_engine::HeapEngineConfig;

use crate::convert::Resolution;
use crate::simple::SimpleValueOptions;

pub use loader::{config_path, resolve_config_path, CONFIG_ENV, DEFAULT_CONFIG_FILE};

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Logging settings consumed by [`crate::logging::init`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set
    pub level: String,
    /// Include the event target in each line
    pub target: bool,
    /// Colored output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            target: false,
            ansi: true,
        }
    }
}

/// Conversion lookup settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// How ties between rules of the same priority are handled
    pub resolution: Resolution,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Config version for future migration support
    pub version: u32,

    pub logging: LoggingConfig,

    /// Options used by `to_simple_value` when none are given
    pub simple_value: SimpleValueOptions,

    pub conversions: ConversionConfig,

    /// Growth policy of the reference heap engine
    pub engine: HeapEngineConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            version: 1,
            logging: LoggingConfig::default(),
            simple_value: SimpleValueOptions::default(),
            conversions: ConversionConfig::default(),
            engine: HeapEngineConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load config from file, creating default if missing.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config = Self::from_toml_str(&content)?;
            tracing::debug!("Loaded config from {:?}", path);
            Ok(config)
        } else {
            let default = Self::default();
            default.save(path)?;
            tracing::info!("Created default config at {:?}", path);
            Ok(default)
        }
    }

    /// Load from the path given by [`config_path`]
    pub fn load_default() -> ConfigResult<Self> {
        Self::load(&config_path())
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save config to file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reload config from file.
    pub fn reload(&mut self, path: &Path) -> ConfigResult<()> {
        let content = std::fs::read_to_string(path)?;
        *self = Self::from_toml_str(&content)?;
        tracing::debug!("Reloaded config from {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::SpecialFloats;

    #[test]
    fn test_core_config_default() {
        let config = CoreConfig::default();
        assert_eq!(config.version, 1);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.conversions.resolution, Resolution::Unique);
        assert_eq!(config.engine.initial_capacity, 4);
    }

    #[test]
    fn test_partial_config() {
        let config = CoreConfig::from_toml_str(
            r#"
            [simple_value]
            special_float_values = "string"

            [conversions]
            resolution = "first_match"
            "#,
        )
        .unwrap();

        assert_eq!(config.version, 1);
        assert_eq!(
            config.simple_value.special_float_values,
            SpecialFloats::String
        );
        assert!(!config.simple_value.pack_simple_arrays);
        assert_eq!(config.conversions.resolution, Resolution::FirstMatch);
        assert_eq!(config.engine.growth_factor, 2.0);
    }

    #[test]
    fn test_load_creates_default_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("typelib.toml");

        let mut config = CoreConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.version, 1);

        std::fs::write(&path, "version = 3\n[logging]\nlevel = \"trace\"\n").unwrap();
        config.reload(&path).unwrap();
        assert_eq!(config.version, 3);
        assert_eq!(config.logging.level, "trace");
        assert!(config.logging.ansi);
    }

    #[test]
    fn test_core_config_serialize() {
        let mut config = CoreConfig::default();
        config.simple_value.enum_as_integer = true;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("version = 1"));
        assert!(toml_str.contains("enum_as_integer = true"));

        let parsed = CoreConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.simple_value, config.simple_value);
    }
}
