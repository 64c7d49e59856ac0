//! Configuration management for Turnstile.

use axum::http::StatusCode;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::http::{RateLimitOptions, DEFAULT_MESSAGE};
use crate::ratelimit::{check_interval, DEFAULT_MAX};

/// Prefix of environment variables overriding the configuration.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Window length in milliseconds
    #[serde(default = "default_reset_interval")]
    pub reset_interval_ms: u64,

    /// Requests allowed per client per window
    #[serde(default = "default_max")]
    pub max: u64,

    /// Body sent with a rejection
    #[serde(default = "default_message")]
    pub message: String,

    /// Status sent with a rejection
    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            reset_interval_ms: default_reset_interval(),
            max: default_max(),
            message: default_message(),
            status_code: default_status_code(),
        }
    }
}

fn default_reset_interval() -> u64 {
    60_000
}

fn default_max() -> u64 {
    DEFAULT_MAX
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

fn default_status_code() -> u16 {
    429
}

impl RateLimitingConfig {
    /// Get the window length.
    pub fn reset_interval(&self) -> Duration {
        Duration::from_millis(self.reset_interval_ms)
    }

    /// Check the values can be used to build a rate limit.
    pub fn validate(&self) -> Result<()> {
        check_interval(self.reset_interval())?;
        self.status()?;
        Ok(())
    }

    /// Convert into options for the middleware.
    pub fn to_options(&self) -> Result<RateLimitOptions> {
        self.validate()?;
        Ok(RateLimitOptions::new()
            .reset_interval(self.reset_interval())
            .max(self.max)
            .message(self.message.clone())
            .status_code(self.status()?))
    }

    fn status(&self) -> Result<StatusCode> {
        StatusCode::from_u16(self.status_code)
            .ok()
            .filter(|status| status.is_client_error() || status.is_server_error())
            .ok_or_else(|| {
                TurnstileError::Config(format!(
                    "rate_limiting.status_code {} is not an HTTP error status",
                    self.status_code
                ))
            })
    }
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, then the environment.
    ///
    /// Environment variables use the `TURNSTILE__` prefix with `__` between
    /// sections, e.g. `TURNSTILE__RATE_LIMITING__MAX=100`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: TurnstileConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.rate_limiting.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(contents)
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.rate_limiting.validate()?;
        Ok(config)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| TurnstileError::Config(e.to_string()))
    }
}
