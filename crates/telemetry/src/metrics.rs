//! Instruments recorded by Turnstile.
//!
//! - `rate_limit.store.duration`: counter store latency in milliseconds, with
//!   `storage` and `outcome` (`success` or `error`).
//! - `rate_limit.decisions`: consumptions by `decision` (`allowed`, `denied`
//!   or `store_error`).
//! - `http.server.request.duration`: request latency in milliseconds, with the
//!   HTTP semantic convention attributes.

use std::time::Duration;

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

/// Instrumentation scope of every Turnstile instrument.
pub const METER_NAME: &str = "turnstile";

/// Counter store latency.
pub const RATE_LIMIT_STORE_DURATION: &str = "rate_limit.store.duration";
/// Consumption decisions.
pub const RATE_LIMIT_DECISIONS: &str = "rate_limit.decisions";
/// HTTP request latency.
pub const HTTP_SERVER_REQUEST_DURATION: &str = "http.server.request.duration";

fn meter() -> Meter {
    opentelemetry::global::meter(METER_NAME)
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// Instruments of the point-consumption engine.
#[derive(Clone)]
pub struct RateLimitMetrics {
    store_duration: Histogram<f64>,
    decisions: Counter<u64>,
}

impl RateLimitMetrics {
    /// Build the instruments from the global meter.
    pub fn new() -> Self {
        let meter = meter();

        Self {
            store_duration: meter
                .f64_histogram(RATE_LIMIT_STORE_DURATION)
                .with_unit("ms")
                .with_description("Latency of counter store increments")
                .build(),
            decisions: meter
                .u64_counter(RATE_LIMIT_DECISIONS)
                .with_description("Point consumptions by decision")
                .build(),
        }
    }

    /// Record one counter store call.
    pub fn record_store_call(&self, storage: &'static str, succeeded: bool, elapsed: Duration) {
        let outcome = if succeeded { "success" } else { "error" };

        self.store_duration.record(
            millis(elapsed),
            &[KeyValue::new("storage", storage), KeyValue::new("outcome", outcome)],
        );
    }

    /// Count one consumption decision.
    pub fn record_decision(&self, decision: &'static str) {
        self.decisions.add(1, &[KeyValue::new("decision", decision)]);
    }
}

impl Default for RateLimitMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Attributes of one served request.
#[derive(Debug)]
pub struct RequestAttributes {
    /// `http.request.method`
    pub method: String,
    /// `http.route`, the matched route template.
    pub route: String,
    /// `http.response.status_code`
    pub status_code: u16,
    /// `rate_limit.outcome`, when the limiter saw the request.
    pub rate_limit_outcome: Option<&'static str>,
}

impl RequestAttributes {
    fn into_key_values(self) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new("http.request.method", self.method),
            KeyValue::new("http.route", self.route),
            KeyValue::new("http.response.status_code", i64::from(self.status_code)),
        ];

        if let Some(outcome) = self.rate_limit_outcome {
            attributes.push(KeyValue::new("rate_limit.outcome", outcome));
        }

        attributes
    }
}

/// Instruments of the HTTP server.
#[derive(Clone)]
pub struct HttpMetrics {
    request_duration: Histogram<f64>,
}

impl HttpMetrics {
    /// Build the instruments from the global meter.
    pub fn new() -> Self {
        Self {
            request_duration: meter()
                .f64_histogram(HTTP_SERVER_REQUEST_DURATION)
                .with_unit("ms")
                .with_description("Duration of HTTP server requests")
                .build(),
        }
    }

    /// Record one served request.
    pub fn record_request(&self, attributes: RequestAttributes, elapsed: Duration) {
        self.request_duration
            .record(millis(elapsed), &attributes.into_key_values());
    }
}

impl Default for HttpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_is_only_attached_when_present() {
        let attributes = RequestAttributes {
            method: "GET".to_string(),
            route: "/health".to_string(),
            status_code: 200,
            rate_limit_outcome: None,
        };

        let keys: Vec<_> = attributes
            .into_key_values()
            .into_iter()
            .map(|kv| kv.key.to_string())
            .collect();

        assert_eq!(
            keys,
            vec!["http.request.method", "http.route", "http.response.status_code"]
        );
    }

    #[test]
    fn limited_request_carries_its_outcome() {
        let attributes = RequestAttributes {
            method: "GET".to_string(),
            route: "/".to_string(),
            status_code: 429,
            rate_limit_outcome: Some("denied"),
        };

        let outcome = attributes
            .into_key_values()
            .into_iter()
            .find(|kv| kv.key.as_str() == "rate_limit.outcome")
            .map(|kv| kv.value.to_string());

        assert_eq!(outcome.as_deref(), Some("denied"));
    }

    #[test]
    fn recording_without_a_provider_is_a_no_op() {
        let metrics = RateLimitMetrics::new();

        metrics.record_store_call("memory", true, Duration::from_micros(250));
        metrics.record_decision("allowed");
    }

    #[test]
    fn durations_are_in_milliseconds() {
        assert_eq!(millis(Duration::from_micros(1_500)), 1.5);
    }
}
