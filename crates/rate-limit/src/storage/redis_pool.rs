//! Pool of multiplexed Redis connections.

use std::{fs, path::Path};

use config::{RedisConfig, RedisTlsConfig};
use deadpool::managed::{self, Metrics, PoolConfig, RecycleError, RecycleResult};
use redis::{Client, ClientTlsConfig, ErrorKind, RedisError, RedisResult, TlsCertificates, aio::MultiplexedConnection};

pub(super) type Pool = managed::Pool<RedisManager>;

/// Opens connections from one client and checks them with `PING` before reuse.
#[derive(Debug)]
pub(super) struct RedisManager {
    client: Client,
}

impl managed::Manager for RedisManager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> RedisResult<MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(&self, conn: &mut MultiplexedConnection, _: &Metrics) -> RecycleResult<RedisError> {
        let reply: String = redis::cmd("PING").query_async(conn).await?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(RecycleError::message(format!("Unexpected PING reply `{reply}`")))
        }
    }
}

fn config_error(description: &'static str, detail: String) -> RedisError {
    RedisError::from((ErrorKind::InvalidClientConfig, description, detail))
}

/// Build the pool. Connections are opened lazily, on first use.
pub(super) fn create_pool(config: &RedisConfig) -> RedisResult<Pool> {
    let url = config
        .connection_url()
        .map_err(|e| config_error("Invalid Redis connection settings", e.to_string()))?;

    let client = match &config.tls {
        Some(tls) => Client::build_with_tls(url.as_str(), tls_certificates(tls)?)?,
        None => Client::open(url.as_str())?,
    };

    let mut pool_config = PoolConfig::new(config.pool.max_size);
    pool_config.timeouts.create = Some(config.pool.connect_timeout);
    pool_config.timeouts.wait = Some(config.pool.wait_timeout);
    pool_config.timeouts.recycle = Some(config.pool.recycle_timeout);

    Pool::builder(RedisManager { client })
        .config(pool_config)
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| config_error("Failed to build the Redis pool", e.to_string()))
}

fn read_pem(path: &Path, description: &'static str) -> RedisResult<Vec<u8>> {
    fs::read(path).map_err(|e| RedisError::from((ErrorKind::IoError, description, format!("{}: {e}", path.display()))))
}

/// Certificates for `rediss://` connections. A client certificate needs its key.
fn tls_certificates(tls: &RedisTlsConfig) -> RedisResult<TlsCertificates> {
    let root_cert = tls
        .ca_cert
        .as_deref()
        .map(|path| read_pem(path, "Failed to read the CA certificate"))
        .transpose()?;

    let client_tls = match (tls.client_cert.as_deref(), tls.client_key.as_deref()) {
        (None, None) => None,
        (Some(cert), Some(key)) => Some(ClientTlsConfig {
            client_cert: read_pem(cert, "Failed to read the client certificate")?,
            client_key: read_pem(key, "Failed to read the client key")?,
        }),
        _ => {
            return Err(config_error(
                "Incomplete mutual TLS settings",
                "`client_cert` and `client_key` must be set together".to_string(),
            ));
        }
    };

    Ok(TlsCertificates { client_tls, root_cert })
}
