//! Configuration management.
//!
//! Defaults plus environment-variable overrides, modeled on the teacher's
//! `ConfigLoader` (`knhk-workflow-engine/src/config/mod.rs`).

use serde::{Deserialize, Serialize};

use crate::error::{MonumentError, MonumentResult};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn validate(&self) -> MonumentResult<()> {
        self.service.validate()?;
        self.logging.validate()?;
        self.store.validate()?;
        Ok(())
    }

    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn load_from_env() -> MonumentResult<Self> {
        let mut config = AppConfig::default();

        if let Ok(val) = std::env::var("MONUMENT_LOG_LEVEL") {
            config.logging.level = val;
        }
        if let Ok(val) = std::env::var("MONUMENT_SERVICE_NAME") {
            config.service.name = val;
        }
        if let Ok(val) = std::env::var("MONUMENT_DATA_DIR") {
            config.store.data_dir = val;
        }
        if let Ok(val) = std::env::var("MONUMENT_BIND_ADDRESS") {
            config.service.bind_address = val;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Service identity and network binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
    pub bind_address: String,
}

impl ServiceConfig {
    pub fn validate(&self) -> MonumentResult<()> {
        if self.name.is_empty() {
            return Err(MonumentError::ParseError {
                detail: "service name cannot be empty".to_string(),
            });
        }
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(MonumentError::ParseError {
                detail: format!("invalid bind address: {}", self.bind_address),
            });
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "monument".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Structured logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl LoggingConfig {
    pub fn validate(&self) -> MonumentResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(MonumentError::ParseError {
                detail: format!("invalid log level: {}", self.level),
            });
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Namespace store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory under which `{namespace}.db` sled databases are opened.
    pub data_dir: String,
    /// Expected schema version; mismatch on open is fatal.
    pub schema_version: u32,
}

impl StoreConfig {
    pub fn validate(&self) -> MonumentResult<()> {
        if self.data_dir.is_empty() {
            return Err(MonumentError::ParseError {
                detail: "data_dir cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/sims".to_string(),
            schema_version: crate::store::SCHEMA_VERSION,
        }
    }
}
