use product_gateway::api::{create_router, AppState};
use product_gateway::cache::ResponseCache;
use product_gateway::config::Settings;
use product_gateway::idempotency::{IdempotencyCoordinator, IdempotencySweeper};
use product_gateway::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use product_gateway::resilience::{ResiliencePolicy, ResilientCall};
use product_gateway::services::ProductService;
use product_gateway::upstream::{ErpClient, WarehouseClient, ERP, WAREHOUSE};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    // Initialize logging and metrics
    init_logging(&LogConfig::from_settings(&settings.application))?;
    let metrics_handle = init_metrics()?;
    info!("Configuration loaded");

    // Upstream clients, each behind its own resilience policy
    let erp = Arc::new(ErpClient::new(&settings.upstreams.erp.base_url)?);
    let warehouse = Arc::new(WarehouseClient::new(&settings.upstreams.warehouse.base_url)?);
    let erp_call = Arc::new(ResilientCall::new(
        ERP,
        ResiliencePolicy::from(&settings.upstreams.erp.resilience),
    ));
    let warehouse_call = Arc::new(ResilientCall::new(
        WAREHOUSE,
        ResiliencePolicy::from(&settings.upstreams.warehouse.resilience),
    ));
    info!(
        erp = %settings.upstreams.erp.base_url,
        warehouse = %settings.upstreams.warehouse.base_url,
        "Upstream clients configured"
    );

    let cache = Arc::new(ResponseCache::new(settings.cache.clone()));
    let product_service = Arc::new(ProductService::new(
        erp,
        warehouse,
        erp_call.clone(),
        warehouse_call.clone(),
        cache,
    ));

    // Idempotency state and its background sweep
    let coordinator = Arc::new(IdempotencyCoordinator::new(settings.idempotency.clone()));
    let sweeper = IdempotencySweeper::new(coordinator.clone(), settings.idempotency.sweep_interval())
        .start()?;

    let health_checker = Arc::new(HealthChecker::new(erp_call, warehouse_call));
    let state = AppState::new(product_service, coordinator, health_checker).with_metrics(metrics_handle);
    let app = create_router(state);

    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Product gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
