//! OpenTelemetry metrics for Turnstile.
//!
//! Components build their instruments once through [`metrics`]. Nothing is
//! exported until [`init`] installs a meter provider, and instruments created
//! before that stay no-ops.

mod exporter;
pub mod metrics;

use config::TelemetryConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;

/// Owns the installed meter provider. Dropping it flushes pending metrics and
/// stops the exporter.
pub struct TelemetryGuard {
    provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    /// Whether a meter provider was installed.
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };

        if let Err(e) = provider.shutdown() {
            log::error!("Failed to shut down the metrics exporter: {e}");
        }
    }
}

/// Install the OTLP metrics exporter when it is enabled.
///
/// Must run inside a Tokio runtime, before the server builds its instruments.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let Some(metrics) = config.otlp_metrics() else {
        log::debug!("Metrics export is disabled");
        return Ok(TelemetryGuard { provider: None });
    };

    let provider = exporter::meter_provider(config, metrics)?;
    opentelemetry::global::set_meter_provider(provider.clone());

    log::info!(
        "Exporting metrics via OTLP/{:?} every {:?}",
        metrics.protocol,
        metrics.export_interval
    );

    Ok(TelemetryGuard {
        provider: Some(provider),
    })
}
