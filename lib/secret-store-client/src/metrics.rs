use crate::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// Point-in-time view of client activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Completed `execute()` calls; retries of one call count once.
    pub total_requests: u64,
    /// Running hit ratio over cache lookups, 0..=1.
    pub cache_hit_rate: f64,
    pub avg_response_time_ms: f64,
    /// Successful logins plus successful token renewals.
    pub auth_renewals: u64,
    /// Running failure ratio over completed requests, 0..=1.
    pub error_rate: f64,
    pub last_auth_time: Option<DateTime<Utc>>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct MetricsState {
    metrics: Metrics,
    cache_lookups: u64,
}

#[derive(Default)]
pub(crate) struct MetricsCollector {
    state: Mutex<MetricsState>,
}

fn running_average(previous: f64, count: u64, value: f64) -> f64 {
    (previous * count as f64 + value) / (count + 1) as f64
}

impl MetricsCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records the terminal outcome of one request, retries included.
    pub(crate) fn record_request(&self, elapsed: Duration, success: bool) {
        let mut state = lock(&self.state);
        let metrics = &mut state.metrics;
        let n = metrics.total_requests;
        let latency_ms = elapsed.as_secs_f64() * 1000.0;

        metrics.avg_response_time_ms = running_average(metrics.avg_response_time_ms, n, latency_ms);
        metrics.error_rate = running_average(metrics.error_rate, n, if success { 0.0 } else { 1.0 });
        metrics.total_requests = n + 1;
    }

    pub(crate) fn record_cache_lookup(&self, hit: bool) {
        let mut state = lock(&self.state);
        let n = state.cache_lookups;
        state.metrics.cache_hit_rate =
            running_average(state.metrics.cache_hit_rate, n, if hit { 1.0 } else { 0.0 });
        state.cache_lookups = n + 1;
    }

    pub(crate) fn record_auth(&self, at: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) {
        let mut state = lock(&self.state);
        state.metrics.auth_renewals += 1;
        state.metrics.last_auth_time = Some(at);
        state.metrics.token_expires_at = expires_at;
    }

    pub(crate) fn snapshot(&self) -> Metrics {
        lock(&self.state).metrics.clone()
    }
}
