//! Prometheus metrics exposition
//!
//! - `oidc_authorize_total` (counter): label `outcome`
//! - `oidc_token_total` (counter): label `outcome`
//! - `oidc_request_duration_seconds` (histogram): label `endpoint`
//!
//! `outcome` is `issued` on success, otherwise the OAuth error code.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Outcome label for a successful request
pub const OUTCOME_ISSUED: &str = "issued";

/// Outcome label for a request whose query or form could not be parsed
pub const OUTCOME_MALFORMED: &str = "invalid_request";

const DURATION_METRIC: &str = "oidc_request_duration_seconds";

const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `oidc_request_duration_seconds` gets explicit buckets so it renders as a
/// histogram with `_bucket` lines rather than a summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Handle backed by a recorder that is never installed globally.
#[cfg(test)]
pub fn detached_handle() -> PrometheusHandle {
    builder().build_recorder().handle()
}

pub fn record_authorize(outcome: &'static str) {
    metrics::counter!("oidc_authorize_total", "outcome" => outcome).increment(1);
}

pub fn record_token(outcome: &'static str) {
    metrics::counter!("oidc_token_total", "outcome" => outcome).increment(1);
}

pub fn record_request(endpoint: &'static str, duration_secs: f64) {
    metrics::histogram!(DURATION_METRIC, "endpoint" => endpoint).record(duration_secs);
}
