use product_gateway::config::ApplicationSettings;
use product_gateway::observability::{
    mask_sensitive, AggregatedHealth, DependencyHealth, HealthChecker, HealthStatus, LatencyTimer,
    LogConfig, LogFormat, Metrics,
};
use product_gateway::resilience::{
    CircuitBreakerPolicy, CircuitState, ResiliencePolicy, ResilientCall,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_log_config_default() {
    let config = LogConfig::default();
    assert_eq!(config.level, "info");
    assert!(config.include_target);
    assert!(!config.include_location);
    assert_eq!(config.format, LogFormat::Pretty);
}

#[test]
fn test_trace_level_includes_location() {
    let settings = ApplicationSettings {
        log_level: "TRACE".to_string(),
        log_format: "compact".to_string(),
        ..ApplicationSettings::default()
    };
    let config = LogConfig::from_settings(&settings);

    assert!(config.include_location);
    assert!(config.include_target);
    assert!(config.directives().starts_with("TRACE,"));
}

#[test]
fn test_mask_sensitive_idempotency_key() {
    let result = mask_sensitive("order-2024-0001-retry", 4);
    assert_eq!(result, "orde*************etry");
}

#[test]
fn test_mask_sensitive_exact_boundary() {
    let result = mask_sensitive("1234", 2);
    assert_eq!(result, "****");
}

#[test]
fn test_metrics_idempotency_recording() {
    let metrics = Metrics::new();
    metrics.record_idempotency_check("new");
    metrics.record_idempotency_check("replayed");
    metrics.record_idempotency_check("in_progress");
    metrics.record_idempotency_completion(true);
    metrics.record_idempotency_sweep(10, 2);
    metrics.set_idempotency_records(42);
}

#[test]
fn test_metrics_upstream_recording() {
    let metrics = Metrics::new();
    metrics.record_upstream_call("erp", "success", 12.0);
    metrics.record_upstream_call("warehouse", "failure", 5000.0);
    metrics.set_circuit_state("warehouse", 2.0);
}

#[test]
fn test_metrics_cache_and_http() {
    let metrics = Metrics::new();
    metrics.record_cache_lookup(true);
    metrics.record_cache_lookup(false);
    metrics.record_cache_invalidation(4);
    metrics.set_cache_entries(17);
    metrics.record_http_request("GET", "/api/v1/products/:id", 200, 5.0);
    metrics.record_http_request("POST", "/api/v1/products", 409, 1.0);
}

#[test]
fn test_latency_timer() {
    let timer = LatencyTimer::new();
    std::thread::sleep(std::time::Duration::from_millis(10));
    let elapsed = timer.elapsed_ms();
    assert!(elapsed >= 10.0);
    assert!(elapsed < 1000.0);
}

#[test]
fn test_dependency_health_open_warehouse() {
    let health = DependencyHealth::from_circuit("warehouse", CircuitState::Open, false);
    assert_eq!(health.name, "warehouse");
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(!health.critical);
}

#[test]
fn test_aggregated_health_one_unhealthy() {
    let dependencies = vec![
        DependencyHealth::from_circuit("erp", CircuitState::Open, true),
        DependencyHealth::from_circuit("warehouse", CircuitState::HalfOpen, false),
    ];
    let health = AggregatedHealth::new("1.0.0".to_string(), 3600, dependencies);

    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert_eq!(health.uptime_seconds, 3600);
}

#[test]
fn test_health_status_serialization() {
    let degraded = serde_json::to_string(&HealthStatus::Degraded).unwrap();
    assert_eq!(degraded, "\"degraded\"");
}

#[tokio::test(start_paused = true)]
async fn test_warehouse_outage_only_degrades() {
    let policy = ResiliencePolicy {
        circuit_breaker: CircuitBreakerPolicy {
            minimum_throughput: 1,
            break_duration: Duration::from_secs(5),
            ..CircuitBreakerPolicy::default()
        },
        ..ResiliencePolicy::default()
    };
    let erp = Arc::new(ResilientCall::new("erp", policy.clone()));
    let warehouse = Arc::new(ResilientCall::new("warehouse", policy));
    let checker = HealthChecker::new(erp, warehouse.clone());

    warehouse
        .circuit_breaker()
        .try_acquire()
        .expect("permit")
        .failure();

    let health = checker.check_all();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(checker.is_alive());
    assert!(checker.is_ready());

    let json = serde_json::to_string(&health).unwrap();
    assert!(json.contains("\"name\":\"warehouse\""));
}
