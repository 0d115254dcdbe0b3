//! Turnstile configuration structures to map the turnstile.toml configuration.

#![deny(missing_docs)]

mod loader;
mod rate_limit;
mod server;
mod telemetry;

use std::path::Path;

pub use rate_limit::*;
use serde::Deserialize;
pub use server::{HealthConfig, ServerConfig};
pub use telemetry::{MetricsConfig, OtlpProtocol, TelemetryConfig};

/// Main configuration structure for the Turnstile application.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,
    /// Telemetry configuration settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> anyhow::Result<Config> {
        loader::parse(content)
    }

    /// Validates the configuration, failing on anything that cannot serve requests.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server.health.validate()?;
        self.rate_limit.validate()
    }
}
