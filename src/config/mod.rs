// src/config/mod.rs
//! Configuration management module
//!
//! Configuration is loaded from `config.toml` when present, overridden by
//! environment variables, and validated before the service starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub speech: SpeechConfig,
    pub auth: AuthConfig,
    pub uploads: UploadsConfig,
    pub recovery: RecoveryConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the document files
    pub data_directory: PathBuf,
    /// Paragraphs deleted per batch by the deletion protocol
    pub delete_batch_size: usize,
}

/// External speech-recognition service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Credential verifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_info_url: String,
    pub timeout_secs: u64,
}

/// Upload URL signer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    pub signer_url: String,
    /// Lifetime of issued upload URLs in seconds
    pub url_ttl_secs: u64,
    pub timeout_secs: u64,
}

/// Recovery sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./data"),
            delete_batch_size: 100,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_info_url: "http://localhost:9091/tokeninfo".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            signer_url: "http://localhost:9092/sign".to_string(),
            url_ttl_secs: 15 * 60,
            timeout_secs: 10,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(file_config) = Self::load_from_file("config.toml") {
            config = file_config;
        }

        config.load_from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Load configuration from environment variables
    pub fn load_from_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            self.server.port = port.parse().context("Invalid SERVER_PORT")?;
        }
        if let Ok(dir) = std::env::var("STORE_DATA_DIRECTORY") {
            self.store.data_directory = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("SPEECH_BASE_URL") {
            self.speech.base_url = url;
        }
        if let Ok(url) = std::env::var("AUTH_TOKEN_INFO_URL") {
            self.auth.token_info_url = url;
        }
        if let Ok(url) = std::env::var("UPLOADS_SIGNER_URL") {
            self.uploads.signer_url = url;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }
        if self.store.delete_batch_size == 0 {
            return Err(anyhow::anyhow!("Delete batch size cannot be 0"));
        }
        if self.speech.base_url.is_empty() {
            return Err(anyhow::anyhow!("Speech service base URL cannot be empty"));
        }
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level)),
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
