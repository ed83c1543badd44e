//! Configuration module
//!
//! Handles loading and saving DBank client configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network::NetworkConfig;
use crate::protocol::{DEFAULT_PORT, MAX_DATAGRAM_SIZE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Server and request settings
    #[serde(default)]
    pub client: ClientConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-attempt reply timeout in ms
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Send attempts per request
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Only accept replies echoing the outstanding request id
    #[serde(default)]
    pub verify_reply_id: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout(),
            max_attempts: default_max_attempts(),
            verify_reply_id: false,
        }
    }
}

impl ClientConfig {
    /// Network settings for the request engine
    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            timeout_ms: self.timeout_ms,
            max_attempts: self.max_attempts,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            verify_reply_id: self.verify_reply_id,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("dbank/config.toml")),
            Some(PathBuf::from("./dbank.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                tracing::debug!("Loading configuration from {}", path.display());
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Example settings for a remote server
pub fn sample_config() -> Config {
    Config {
        general: GeneralConfig { verbose: false },
        client: ClientConfig {
            host: "bank.example.com".to_string(),
            timeout_ms: 2000,
            ..Default::default()
        },
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    Ok(toml::to_string_pretty(&sample_config())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.client.port, DEFAULT_PORT);
        assert_eq!(config.client.max_attempts, 5);
        assert_eq!(config.client.timeout_ms, 5000);
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.client.verify_reply_id = true;
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.client.port, config.client.port);
        assert!(loaded.client.verify_reply_id);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nhost = \"10.0.0.2\"").unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.client.host, "10.0.0.2");
        assert_eq!(loaded.client.port, DEFAULT_PORT);
        assert!(!loaded.general.verbose);

        let network = loaded.client.network();
        assert_eq!(network.host, "10.0.0.2");
        assert_eq!(network.max_datagram_size, MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/dbank.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.client.host, "bank.example.com");
        assert_eq!(parsed.client.timeout_ms, 2000);
    }

    #[test]
    fn test_save_sample_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dbank.toml");

        sample_config().save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.client.host, "bank.example.com");
        assert_eq!(loaded.client.port, DEFAULT_PORT);
    }
}
