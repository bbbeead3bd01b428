/// Configuration management for blipd
use crate::error::{ApError, ApResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use url::Url;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public base URL of this node. Reference resolution treats any URL
    /// whose host and port differ from this one as remote.
    pub base_url: Url,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApResult<Self> {
        let hostname = env::var("BLIPD_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("BLIPD_PORT")
            .unwrap_or_else(|_| "4010".to_string())
            .parse::<u16>()
            .map_err(|e| ApError::Internal(format!("invalid BLIPD_PORT: {}", e)))?;

        let base_url = env::var("BLIPD_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let base_url = Url::parse(&base_url)
            .map_err(|e| ApError::Internal(format!("invalid BLIPD_BASE_URL: {}", e)))?;

        let database = env::var("BLIPD_DATABASE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/blipd.sqlite"));

        let level = env::var("BLIPD_LOG").unwrap_or_else(|_| "info".to_string());

        let config = Self {
            service: ServiceConfig {
                hostname,
                port,
                base_url,
            },
            storage: StorageConfig { database },
            logging: LoggingConfig { level },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ApResult<()> {
        if self.service.base_url.host_str().is_none() {
            return Err(ApError::Internal(
                "BLIPD_BASE_URL must contain a host".to_string(),
            ));
        }

        match self.service.base_url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ApError::Internal(format!(
                "BLIPD_BASE_URL scheme must be http or https, got {}",
                other
            ))),
        }
    }
}
