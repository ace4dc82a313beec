//! Configuration types for httptap

use serde::{Deserialize, Serialize};

use crate::{Result, TapError};

/// Capture configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Whether interception starts enabled
    #[serde(default)]
    pub start_enabled: bool,
    /// Client tuning
    #[serde(default)]
    pub client: ClientConfig,
}

/// Connection pool tuning for the instrumented client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Seconds an idle pooled connection is kept alive
    pub pool_idle_timeout_secs: u64,
    /// Maximum idle connections retained per host
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_idle_timeout_secs: 90,
            pool_max_idle_per_host: 10,
        }
    }
}

impl CaptureConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TapError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TapError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.client.pool_idle_timeout_secs == 0 {
            return Err(TapError::Config(
                "pool_idle_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.client.pool_max_idle_per_host == 0 {
            return Err(TapError::Config(
                "pool_max_idle_per_host must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
