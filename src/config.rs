use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Origin of the analysis backend, without a trailing path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_not_found_initial_ms")]
    pub not_found_initial_ms: u64,
    #[serde(default = "default_not_found_factor")]
    pub not_found_factor: f64,
    #[serde(default = "default_not_found_max_ms")]
    pub not_found_max_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            not_found_initial_ms: default_not_found_initial_ms(),
            not_found_factor: default_not_found_factor(),
            not_found_max_ms: default_not_found_max_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_initial_delay_ms() -> u64 {
    5000
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    60 // 5 minutes at the default interval
}

fn default_not_found_initial_ms() -> u64 {
    1000
}

fn default_not_found_factor() -> f64 {
    1.5
}

fn default_not_found_max_ms() -> u64 {
    5000
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("pipewright").required(false));
        }

        // Environment variable overrides with PIPEWRIGHT_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("PIPEWRIGHT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let config: AppConfig = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let url = self.backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "backend.base_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.polling.max_attempts == 0 {
            return Err(AppError::Config(
                "polling.max_attempts must be at least 1".to_string(),
            ));
        }
        let factor = self.polling.not_found_factor;
        if !factor.is_finite() || factor < 1.0 {
            return Err(AppError::Config(
                "polling.not_found_factor must be a finite number >= 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }
}
