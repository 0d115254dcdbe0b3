//! Rate limiting configuration structures.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use duration_str::deserialize_duration;
use indoc::indoc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

/// Rate limiting configuration.
///
/// Only `points` and `duration` are required, everything else has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Number of points a key can consume within one window.
    pub points: u32,
    /// Length of the window, starting at the first consumption of a key.
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    /// Prefix for every counter key, to share one store between several limiters.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Whether to emit rate limit headers on processed requests.
    #[serde(default = "default_true")]
    pub headers: bool,
    /// Per-header switches, consulted when `headers` is enabled.
    #[serde(default)]
    pub add_headers: AddHeadersConfig,
    /// Where in the request lifecycle the limiter runs.
    #[serde(default)]
    pub hook: Hook,
    /// What to do with a request when the storage backend fails.
    #[serde(default)]
    pub on_store_error: StoreErrorPolicy,
    /// Derive the client address from `X-Forwarded-For` and `X-Real-IP`.
    ///
    /// Only enable behind a proxy that overwrites these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl RateLimitConfig {
    /// Creates a configuration with the given budget and defaults for everything else.
    pub fn new(points: u32, duration: Duration) -> Self {
        Self {
            points,
            duration,
            key_prefix: default_key_prefix(),
            storage: StorageConfig::default(),
            headers: true,
            add_headers: AddHeadersConfig::default(),
            hook: Hook::default(),
            on_store_error: StoreErrorPolicy::default(),
            trust_proxy_headers: false,
        }
    }

    /// Validates the limits and the storage selection.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.points == 0 {
            bail!("`rate_limit.points` must be greater than zero");
        }

        if self.duration.as_millis() == 0 {
            bail!("`rate_limit.duration` must be at least one millisecond");
        }

        match &self.storage {
            StorageConfig::Memory(memory) if memory.sweep_interval.is_zero() => {
                bail!("`rate_limit.storage.sweep_interval` must be greater than zero");
            }
            StorageConfig::Memory(_) => (),
            StorageConfig::Redis(redis) => redis.validate()?,
        }

        Ok(())
    }
}

fn default_key_prefix() -> String {
    "rate-limiter".to_string()
}

fn default_true() -> bool {
    true
}

/// Per-header switches for the rate limit response headers.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AddHeadersConfig {
    /// Emit `X-RateLimit-Limit`.
    pub limit: bool,
    /// Emit `X-RateLimit-Remaining`.
    pub remaining: bool,
    /// Emit `X-RateLimit-Reset`.
    pub reset: bool,
    /// Emit `Retry-After` on rejected requests.
    #[serde(alias = "retry-after")]
    pub retry_after: bool,
}

impl Default for AddHeadersConfig {
    fn default() -> Self {
        Self {
            limit: true,
            remaining: true,
            reset: true,
            retry_after: true,
        }
    }
}

/// Request lifecycle stage the limiter is registered at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    /// Runs for every request, before routing.
    #[default]
    OnRequest,
    /// Runs only for requests that matched a route, right before the handler.
    PreHandler,
}

/// Policy applied when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreErrorPolicy {
    /// Let the request through without rate limit headers.
    Open,
    /// Reject the request with `503 Service Unavailable`.
    #[default]
    Closed,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (default).
    Memory(MemoryConfig),
    /// Redis storage with configuration.
    Redis(Box<RedisConfig>),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory(MemoryConfig::default())
    }
}

/// In-memory storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// How often expired counters are evicted.
    #[serde(deserialize_with = "deserialize_duration")]
    pub sweep_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Redis storage configuration.
///
/// Either `url`, or `host` with the optional `port`, `password` and `db`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Redis connection URL (redis:// or rediss:// for TLS).
    pub url: Option<String>,
    /// Redis host name.
    pub host: Option<String>,
    /// Redis port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Password for the Redis `AUTH` command.
    pub password: Option<SecretString>,
    /// Logical database index.
    #[serde(default)]
    pub db: i64,
    /// Connection pool configuration.
    #[serde(default)]
    pub pool: RedisPoolConfig,
    /// TLS configuration.
    pub tls: Option<RedisTlsConfig>,
    /// Upper bound for a single counter update, including waiting for a pooled connection.
    #[serde(default = "default_response_timeout", deserialize_with = "deserialize_duration")]
    pub response_timeout: Duration,
}

fn default_port() -> u16 {
    6379
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(1)
}

impl RedisConfig {
    /// Creates a configuration connecting to the given URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            host: None,
            port: default_port(),
            password: None,
            db: 0,
            pool: RedisPoolConfig::default(),
            tls: None,
            response_timeout: default_response_timeout(),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        match (&self.url, &self.host) {
            (None, None) => bail!(indoc! {r#"
                Redis storage requires connection information.

                Either set a URL:

                  [rate_limit.storage]
                  type = "redis"
                  url = "redis://localhost:6379/0"

                or a host:

                  [rate_limit.storage]
                  type = "redis"
                  host = "localhost"
                  port = 6379
            "#}),
            (Some(_), Some(_)) => bail!("Redis storage accepts either `url` or `host`, not both"),
            _ => (),
        }

        if self.response_timeout.is_zero() {
            bail!("`rate_limit.storage.response_timeout` must be greater than zero");
        }

        self.connection_url().map(|_| ())
    }

    /// The URL the client connects to, with credentials.
    pub fn connection_url(&self) -> anyhow::Result<Url> {
        if let Some(url) = &self.url {
            return Url::parse(url).context("Invalid Redis URL");
        }

        let Some(host) = &self.host else {
            bail!("Redis storage requires either `url` or `host`");
        };

        let scheme = if self.tls.is_some() { "rediss" } else { "redis" };
        let mut url = Url::parse(&format!("{scheme}://{host}:{}/{}", self.port, self.db))
            .with_context(|| format!("Invalid Redis host `{host}`"))?;

        if let Some(password) = &self.password
            && url.set_password(Some(password.expose_secret())).is_err()
        {
            bail!("Cannot set a password on the Redis URL");
        }

        Ok(url)
    }
}

/// Pool of multiplexed Redis connections.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisPoolConfig {
    /// Connections kept open at most.
    pub max_size: usize,
    /// Bound on opening a connection.
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    /// Bound on waiting for a free connection when all are in use.
    #[serde(deserialize_with = "deserialize_duration")]
    pub wait_timeout: Duration,
    /// Bound on the `PING` checking an idle connection before reuse.
    #[serde(deserialize_with = "deserialize_duration")]
    pub recycle_timeout: Duration,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            connect_timeout: Duration::from_secs(5),
            wait_timeout: Duration::from_secs(5),
            recycle_timeout: Duration::from_secs(1),
        }
    }
}

/// Certificates for `rediss://` connections. All files are PEM encoded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisTlsConfig {
    /// Root certificate trusted in addition to the platform roots.
    pub ca_cert: Option<PathBuf>,
    /// Client certificate for mutual TLS. Requires `client_key`.
    pub client_cert: Option<PathBuf>,
    /// Private key of `client_cert`.
    pub client_key: Option<PathBuf>,
}
