use crate::config::AppConfig;
use crate::store::IncidentStore;
use emberlog_core::ratelimit::RateLimiter;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: IncidentStore,
    pub general_limiter: Arc<RateLimiter>,
    pub auth_limiter: Arc<RateLimiter>,
    pub metrics: Option<PrometheusHandle>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, store: IncidentStore) -> Self {
        Self {
            general_limiter: Arc::new(RateLimiter::new(config.general_limit)),
            auth_limiter: Arc::new(RateLimiter::new(config.auth_limit)),
            config: Arc::new(config),
            store,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Drops rate-limit entries that no longer constrain anyone.
    pub fn prune_rate_limits(&self) -> usize {
        self.general_limiter.prune() + self.auth_limiter.prune()
    }
}
