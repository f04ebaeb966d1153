//! Lute configuration system
//!
//! This crate provides centralized configuration management for Lute,
//! loading settings from `lute.toml` as an alternative to environment
//! variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Lute
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LuteConfig {
    /// Layout table settings
    pub tables: TablesConfig,
    /// Shaping engine settings
    pub engine: EngineConfig,
}

/// Layout table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    /// Directory holding `.flt` table definitions
    pub dir: Option<PathBuf>,
}

/// Shaping engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial output-buffer allocation as a multiple of the segment
    /// length (doubled on each capacity retry)
    pub initial_buffer_scale: usize,
    /// Emit interpreter trace events
    pub trace: bool,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self { dir: None }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_buffer_scale: 4,
            trace: false,
        }
    }
}

impl LuteConfig {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the lute.toml configuration file
    ///
    /// # Returns
    /// * `Ok(LuteConfig)` - Successfully loaded configuration
    /// * `Err(String)` - Error message if loading failed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Load configuration from the default location (lute.toml in the
    /// current directory) or return default configuration if the file
    /// doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file("lute.toml").unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file
    /// values. This allows for temporary overrides without modifying
    /// the config file.
    pub fn merge_with_env(&mut self) {
        if let Ok(dir) = std::env::var("LUTE_TABLES_DIR") {
            self.tables.dir = Some(PathBuf::from(dir));
        }
        if let Ok(val) = std::env::var("LUTE_BUFFER_SCALE") {
            if let Ok(scale) = val.parse::<usize>() {
                self.engine.initial_buffer_scale = scale;
            }
        }
        if let Ok(val) = std::env::var("LUTE_TRACE") {
            self.engine.trace = val == "1" || val.eq_ignore_ascii_case("true");
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// This is the recommended way to load configuration:
    /// 1. Load from lute.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LuteConfig::default();
        assert_eq!(config.engine.initial_buffer_scale, 4);
        assert!(!config.engine.trace);
        assert!(config.tables.dir.is_none());
    }

    #[test]
    fn test_toml_serialization() {
        let config = LuteConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: LuteConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.engine.initial_buffer_scale, 4);
    }

    #[test]
    fn test_load_or_default() {
        // Should not panic even if lute.toml doesn't exist
        let config = LuteConfig::load_or_default();
        assert_eq!(config.engine.initial_buffer_scale, 4);
    }

    #[test]
    fn test_merge_with_env() {
        unsafe {
            std::env::set_var("LUTE_TABLES_DIR", "/tmp/flt");
            std::env::set_var("LUTE_BUFFER_SCALE", "8");
        }

        let mut config = LuteConfig::default();
        config.merge_with_env();

        assert_eq!(config.tables.dir.as_deref(), Some(Path::new("/tmp/flt")));
        assert_eq!(config.engine.initial_buffer_scale, 8);

        unsafe {
            std::env::remove_var("LUTE_TABLES_DIR");
            std::env::remove_var("LUTE_BUFFER_SCALE");
        }
    }
}
