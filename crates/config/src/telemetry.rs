//! Telemetry configuration.

use std::{collections::BTreeMap, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;
use url::Url;

/// Telemetry configuration. Metrics are only exported when `[telemetry.metrics]`
/// is enabled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `service.name` of the exported resource. Defaults to `turnstile`.
    pub service_name: Option<String>,
    /// Extra attributes of the exported resource.
    pub resource_attributes: BTreeMap<String, String>,
    /// OTLP metrics export.
    pub metrics: MetricsConfig,
}

impl TelemetryConfig {
    /// The metrics exporter settings, if export is enabled.
    pub fn otlp_metrics(&self) -> Option<&MetricsConfig> {
        Some(&self.metrics).filter(|metrics| metrics.enabled)
    }
}

/// OTLP metrics exporter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether metrics are exported.
    pub enabled: bool,
    /// Collector endpoint. The exporter default for the protocol when unset.
    pub endpoint: Option<Url>,
    /// Transport to the collector.
    pub protocol: OtlpProtocol,
    /// Timeout of one export.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Delay between two exports.
    #[serde(deserialize_with = "deserialize_duration")]
    pub export_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            protocol: OtlpProtocol::default(),
            timeout: Duration::from_secs(10),
            export_interval: Duration::from_secs(30),
        }
    }
}

/// OTLP transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    /// gRPC, usually on port 4317.
    #[default]
    Grpc,
    /// HTTP with protobuf payloads, usually on port 4318.
    Http,
}
