use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global Prometheus recorder. The handle renders `/metrics`.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

pub fn record_request(method: &str) {
    counter!("http_requests_total", "method" => method.to_string()).increment(1);
}

pub fn record_rate_limited(limiter: &'static str) {
    counter!("rate_limited_total", "limiter" => limiter).increment(1);
}

pub fn record_rejection(stage: &'static str) {
    counter!("pipeline_rejections_total", "stage" => stage).increment(1);
}

pub fn record_auth_failure() {
    counter!("auth_failures_total").increment(1);
}

pub fn record_upload_rejected(reason: &'static str) {
    counter!("uploads_rejected_total", "reason" => reason).increment(1);
}

pub fn record_upload_stored() {
    counter!("uploads_stored_total").increment(1);
}

pub fn record_persist_failure() {
    counter!("store_persist_failures_total").increment(1);
}

pub fn set_stored_incidents(count: usize) {
    gauge!("incidents_stored").set(count as f64);
}
