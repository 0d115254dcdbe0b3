//! Turnstile server library.
//!
//! Provides the rate limiting middleware, and a reusable server function to serve
//! Turnstile either for the binary, or for the integration tests.

#![deny(missing_docs)]

mod metrics;
mod rate_limit;

use std::{net::SocketAddr, sync::Arc};

use ::rate_limit::RateLimiter;
use anyhow::anyhow;
use axum::{Json, Router, routing::get};
use config::Config;
use metrics::MetricsLayer;
use tokio::net::TcpListener;

pub use self::rate_limit::{
    BoxError, ErrorHandler, ErrorHandling, ErrorResponseBuilder, KeyGenerator, RateLimitLayer, RateLimitOutcome,
    RateLimitService, WhiteList,
};

/// Configuration for serving Turnstile.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Turnstile TOML configuration.
    pub config: Config,
}

/// Starts and runs the Turnstile server with the provided configuration.
///
/// Fails before binding when the configuration is invalid or the counter store
/// cannot be reached.
pub async fn serve(ServeConfig { listen_address, config }: ServeConfig) -> anyhow::Result<()> {
    config.validate()?;

    let app = router(&config).await?;

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    log::info!(
        "Rate limiting {} requests per {:?} at http://{listen_address}",
        config.rate_limit.points,
        config.rate_limit.duration
    );

    if config.server.health.enabled {
        log::info!(
            "Health check endpoint available at: http://{listen_address}{}",
            config.server.health.path
        );
    }

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;

    Ok(())
}

async fn router(config: &Config) -> anyhow::Result<Router> {
    let limiter = RateLimiter::new(&config.rate_limit)
        .await
        .map_err(|e| anyhow!("Failed to initialize rate limit storage: {e}"))?;

    let layer = RateLimitLayer::new(Arc::new(limiter), &config.rate_limit);

    log::debug!("Applying rate limiting middleware at the {:?} hook", config.rate_limit.hook);

    let limited = Router::new().route("/", get(|| async { Json(serde_json::json!({ "status": "ok" })) }));
    let mut app = layer.apply(limited);

    // Health endpoint is merged after the limiter, so it is never rate limited.
    if config.server.health.enabled {
        let health = Router::new().route(&config.server.health.path, get(health));
        app = app.merge(health);
    }

    Ok(app.layer(MetricsLayer::default()))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
