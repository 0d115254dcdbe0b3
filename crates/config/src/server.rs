//! HTTP server configuration settings.

use std::net::SocketAddr;

use anyhow::bail;
use serde::Deserialize;

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// Health endpoint configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Health endpoint, mounted next to the rate limited routes and never counted.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the health endpoint is served.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path of the health endpoint.
    #[serde(default = "default_path")]
    pub path: String,
}

impl HealthConfig {
    /// The path must be routable and must not shadow the rate limited root.
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if !self.path.starts_with('/') {
            bail!("`server.health.path` must start with `/`, got `{}`", self.path);
        }

        if self.path == "/" {
            bail!("`server.health.path` cannot be `/`, which is the rate limited route");
        }

        Ok(())
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_path(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_path() -> String {
    "/health".to_string()
}
