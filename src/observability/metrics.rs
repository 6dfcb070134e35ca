use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the product gateway.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    /// `outcome` is one of `new`, `replayed`, `in_progress`.
    pub fn record_idempotency_check(&self, outcome: &str) {
        counter!("gateway_idempotency_checks_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_idempotency_completion(&self, success: bool) {
        counter!("gateway_idempotency_completions_total", "success" => success.to_string()).increment(1);
    }

    pub fn record_idempotency_sweep(&self, expired_records: usize, orphaned_locks: usize) {
        counter!("gateway_idempotency_swept_records_total").increment(expired_records as u64);
        counter!("gateway_idempotency_swept_locks_total").increment(orphaned_locks as u64);
    }

    pub fn set_idempotency_records(&self, count: usize) {
        gauge!("gateway_idempotency_records").set(count as f64);
    }

    pub fn record_cache_lookup(&self, cache_hit: bool) {
        counter!("gateway_cache_lookups_total", "cache_hit" => cache_hit.to_string()).increment(1);
    }

    pub fn record_cache_invalidation(&self, removed: usize) {
        counter!("gateway_cache_invalidations_total").increment(1);
        histogram!("gateway_cache_invalidated_entries").record(removed as f64);
    }

    pub fn set_cache_entries(&self, count: usize) {
        gauge!("gateway_cache_entries").set(count as f64);
    }

    pub fn record_upstream_call(&self, dependency: &str, outcome: &str, duration_ms: f64) {
        counter!("gateway_upstream_calls_total", "dependency" => dependency.to_string(), "outcome" => outcome.to_string()).increment(1);
        histogram!("gateway_upstream_call_duration_ms", "dependency" => dependency.to_string()).record(duration_ms);
    }

    /// 0 = closed, 1 = half-open, 2 = open.
    pub fn set_circuit_state(&self, dependency: &str, state: f64) {
        gauge!("gateway_circuit_state", "dependency" => dependency.to_string()).set(state);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
///
/// Safe to call more than once; the recorder is installed on the first call.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();

    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();
    METRICS.get_or_init(Metrics::new);

    Ok(handle)
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("gateway_idempotency_checks_total", Unit::Count, "Idempotency lookups by outcome");
    describe_counter!("gateway_idempotency_completions_total", Unit::Count, "Operations marked completed or failed");
    describe_counter!("gateway_idempotency_swept_records_total", Unit::Count, "Expired idempotency records removed");
    describe_counter!("gateway_idempotency_swept_locks_total", Unit::Count, "Orphaned per-key locks removed");
    describe_gauge!("gateway_idempotency_records", Unit::Count, "Idempotency records currently held");

    describe_counter!("gateway_cache_lookups_total", Unit::Count, "Response cache lookups");
    describe_counter!("gateway_cache_invalidations_total", Unit::Count, "Pattern invalidations of the response cache");
    describe_histogram!("gateway_cache_invalidated_entries", Unit::Count, "Entries removed per invalidation");
    describe_gauge!("gateway_cache_entries", Unit::Count, "Entries currently cached");

    describe_counter!("gateway_upstream_calls_total", Unit::Count, "Upstream call attempts by outcome");
    describe_histogram!("gateway_upstream_call_duration_ms", Unit::Milliseconds, "Upstream call latency in milliseconds");
    describe_gauge!("gateway_circuit_state", Unit::Count, "Circuit state per dependency (0 closed, 1 half-open, 2 open)");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
