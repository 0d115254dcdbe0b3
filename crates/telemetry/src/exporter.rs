use anyhow::Context;
use config::{MetricsConfig, OtlpProtocol, TelemetryConfig};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};

use crate::metrics::METER_NAME;

pub(crate) fn meter_provider(config: &TelemetryConfig, metrics: &MetricsConfig) -> anyhow::Result<SdkMeterProvider> {
    let exporter = match metrics.protocol {
        OtlpProtocol::Grpc => {
            let mut builder = MetricExporter::builder().with_tonic().with_timeout(metrics.timeout);

            if let Some(endpoint) = &metrics.endpoint {
                builder = builder.with_endpoint(endpoint.as_str());
            }

            builder.build().context("Failed to create the gRPC metrics exporter")?
        }
        OtlpProtocol::Http => {
            let mut builder = MetricExporter::builder().with_http().with_timeout(metrics.timeout);

            if let Some(endpoint) = &metrics.endpoint {
                builder = builder.with_endpoint(endpoint.as_str());
            }

            builder.build().context("Failed to create the HTTP metrics exporter")?
        }
    };

    match &metrics.endpoint {
        Some(endpoint) => log::debug!("Metrics exporter targets {endpoint}"),
        None => log::debug!("Metrics exporter targets the default {:?} collector", metrics.protocol),
    }

    let reader = PeriodicReader::builder(exporter)
        .with_interval(metrics.export_interval)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource(config))
        .with_reader(reader)
        .build())
}

fn resource(config: &TelemetryConfig) -> Resource {
    let service_name = config.service_name.as_deref().unwrap_or(METER_NAME);

    let attributes = config
        .resource_attributes
        .iter()
        .map(|(key, value)| KeyValue::new(key.clone(), value.clone()));

    Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attributes(attributes)
        .build()
}
