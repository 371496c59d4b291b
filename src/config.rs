// Configuration - node settings and deployment parameters

use crate::identity::{Address, AddressError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

pub const DATA_DIR_ENV: &str = "SPLITTER_DATA_DIR";
pub const LOG_ENV: &str = "SPLITTER_LOG";
pub const RECIPIENT_ENV: [&str; 3] = [
    "RECIPIENT1_ADDRESS",
    "RECIPIENT2_ADDRESS",
    "RECIPIENT3_ADDRESS",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing {0}")]
    Missing(&'static str),

    #[error("Invalid address in {name}: {source}")]
    InvalidAddress {
        name: String,
        #[source]
        source: AddressError,
    },
}

// ============================================================================
// NODE CONFIG
// ============================================================================

/// Where the node keeps its data and how loudly it logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// sled database directory
    pub data_dir: PathBuf,
    /// tracing `EnvFilter` directive
    pub log_filter: String,
    /// Flush the store after every command
    pub flush_on_write: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".splitter"),
            log_filter: "info".to_string(),
            flush_on_write: true,
        }
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SPLITTER_DATA_DIR` and `SPLITTER_LOG`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(filter) = env::var(LOG_ENV) {
            config.log_filter = filter;
        }
        config
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    pub fn with_flush_on_write(mut self, flush: bool) -> Self {
        self.flush_on_write = flush;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir cannot be empty".to_string()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter cannot be empty".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// DEPLOY CONFIG
// ============================================================================

/// The three initial recipients of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    pub recipients: [Address; 3],
}

impl DeployConfig {
    /// Parse three address strings, naming the offending slot on failure
    pub fn parse(values: [&str; 3]) -> Result<Self, ConfigError> {
        let mut recipients = [Address::ZERO; 3];
        for (i, value) in values.iter().enumerate() {
            recipients[i] = Address::parse(value).map_err(|source| ConfigError::InvalidAddress {
                name: format!("recipient{}", i + 1),
                source,
            })?;
        }
        Ok(Self { recipients })
    }

    /// Read `RECIPIENT1_ADDRESS`, `RECIPIENT2_ADDRESS`, `RECIPIENT3_ADDRESS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut recipients = [Address::ZERO; 3];
        for (i, name) in RECIPIENT_ENV.into_iter().enumerate() {
            let value = env::var(name).map_err(|_| ConfigError::Missing(name))?;
            recipients[i] = Address::parse(&value).map_err(|source| ConfigError::InvalidAddress {
                name: name.to_string(),
                source,
            })?;
        }
        Ok(Self { recipients })
    }
}
