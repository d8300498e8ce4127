/*!
 * Configuration management for devmodel.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings for the device model server.
 */
use std::path::Path;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Core configuration for devmodel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Transport configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Security configuration
    #[serde(default)]
    pub security: SecurityConfig,

    /// Device model configuration
    #[serde(default)]
    pub model: ModelConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, "devmodel=debug", ...)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to include the event target in log lines
    #[serde(default = "default_true")]
    pub with_target: bool,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the socket front end binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port the socket front end listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a connection may stay idle between requests, in milliseconds
    /// (0 means no timeout)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Longest request line accepted, in bytes
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Root directory for static assets served next to the device model
    #[serde(default = "default_static_root")]
    pub static_root: String,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Enable scope-based authorization of requests
    #[serde(default)]
    pub authorization_enabled: bool,

    /// Secure communication mode ("off" or "tls")
    #[serde(default = "default_secure_comms")]
    pub secure_comms: String,

    /// TLS certificate path (if secure_comms is "tls")
    #[serde(default = "default_tls_cert")]
    pub tls_cert: String,

    /// TLS key path (if secure_comms is "tls")
    #[serde(default = "default_tls_key")]
    pub tls_key: String,
}

/// Device model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Device model files to load at startup
    #[serde(default)]
    pub files: Vec<String>,

    /// Default maximum number of array elements / string characters
    #[serde(default = "default_max_length")]
    pub default_max_length: usize,

    /// Default maximum summed length of all strings in a string array
    #[serde(default = "default_total_length")]
    pub default_total_length: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            read_timeout_ms: default_read_timeout_ms(),
            max_request_bytes: default_max_request_bytes(),
            static_root: default_static_root(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            authorization_enabled: false,
            secure_comms: default_secure_comms(),
            tls_cert: default_tls_cert(),
            tls_key: default_tls_key(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            default_max_length: default_max_length(),
            default_total_length: default_total_length(),
        }
    }
}

impl SecurityConfig {
    /// Whether TLS was requested
    pub fn tls_enabled(&self) -> bool {
        self.secure_comms.eq_ignore_ascii_case("tls")
    }
}

fn default_app_name() -> String {
    "devmodel".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6254
}

fn default_read_timeout_ms() -> u64 {
    30_000
}

fn default_max_request_bytes() -> usize {
    1024 * 1024
}

fn default_static_root() -> String {
    "./static".to_string()
}

fn default_secure_comms() -> String {
    "off".to_string()
}

fn default_tls_cert() -> String {
    "./certs/cert.pem".to_string()
}

fn default_tls_key() -> String {
    "./certs/key.pem".to_string()
}

fn default_max_length() -> usize {
    1024
}

fn default_total_length() -> usize {
    1024
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    override_with: Option<Config>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Override with an existing config
    pub fn override_with(mut self, config: Config) -> Self {
        self.override_with = Some(config);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        if let Some(override_config) = self.override_with {
            return Ok(override_config);
        }

        let mut config_builder = ConfigLib::builder();

        // Start with default values
        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

impl Config {
    /// Check values that serde cannot reject on its own
    pub fn validate(&self) -> Result<()> {
        if self.server.max_request_bytes == 0 {
            return Err(Error::config("server.max_request_bytes must be greater than 0"));
        }
        if self.model.default_max_length == 0 {
            return Err(Error::config("model.default_max_length must be greater than 0"));
        }
        if self.model.default_total_length == 0 {
            return Err(Error::config("model.default_total_length must be greater than 0"));
        }
        match self.security.secure_comms.to_ascii_lowercase().as_str() {
            "off" | "tls" => Ok(()),
            other => Err(Error::config(format!(
                "security.secure_comms must be \"off\" or \"tls\", got \"{}\"",
                other
            ))),
        }
    }
}
