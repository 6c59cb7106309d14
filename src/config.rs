//! Configuration management for gemchat.
//!
//! Configuration is loaded from `~/.config/gemchat/config.toml`. All the
//! fixed paths the rest of the crate uses (key cache, persona overrides,
//! transcript directory) are resolved here so that nothing else touches
//! the home directory directly.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Model requested when neither the CLI nor the config file names one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model used when `--model` is not given (default: gemini-2.5-flash).
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Persona used when `--style` is not given (default: "default").
    #[serde(default = "default_style")]
    pub default_style: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_style: default_style(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_style() -> String {
    "default".to_string()
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("gemchat"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the cached API key file path.
    pub fn key_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("api_key"))
    }

    /// Get the persona override file path.
    pub fn personas_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("personas.toml"))
    }

    /// Get the transcript log directory.
    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("logs"))
    }

    /// Load configuration from file, using defaults if not found.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Create the config file with defaults if it does not exist yet.
    /// Returns the path and whether a new file was written.
    pub fn ensure_exists() -> Result<(PathBuf, bool)> {
        let path = Self::config_path()?;
        let created = write_default_if_missing(&path)?;
        Ok((path, created))
    }

}

fn write_default_if_missing(path: &std::path::Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_default_if_missing_creates_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        assert!(write_default_if_missing(&path).unwrap());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("default_model"));

        // An existing file is left alone.
        std::fs::write(&path, "default_style = \"pirate\"\n").unwrap();
        assert!(!write_default_if_missing(&path).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "default_style = \"pirate\"\n"
        );
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.default_style, "default");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("gemini-2.5-flash"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
default_model = "gemini-2.5-pro"
default_style = "hacker"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.default_model, "gemini-2.5-pro");
        assert_eq!(config.default_style, "hacker");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(r#"default_style = "pirate""#).unwrap();
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.default_style, "pirate");
    }
}
