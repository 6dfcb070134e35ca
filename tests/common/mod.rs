#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use mockall::mock;
use product_gateway::api::{create_router, AppState};
use product_gateway::cache::ResponseCache;
use product_gateway::config::{CacheSettings, IdempotencySettings};
use product_gateway::error::Result;
use product_gateway::idempotency::IdempotencyCoordinator;
use product_gateway::models::{ErpProduct, ErpProductPage, NewProduct, ProductUpdate, StockInfo};
use product_gateway::observability::HealthChecker;
use product_gateway::resilience::{
    CircuitBreakerPolicy, ResiliencePolicy, ResilientCall, RetryPolicy,
};
use product_gateway::services::ProductService;
use product_gateway::upstream::{ErpApi, WarehouseApi};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

mock! {
    pub Erp {}

    #[async_trait]
    impl ErpApi for Erp {
        async fn get_product(&self, id: Uuid) -> Result<ErpProduct>;
        async fn list_products(&self, page: u32, page_size: u32) -> Result<ErpProductPage>;
        async fn create_product(&self, product: &NewProduct) -> Result<ErpProduct>;
        async fn update_product(&self, id: Uuid, update: &ProductUpdate) -> Result<ErpProduct>;
        async fn delete_product(&self, id: Uuid) -> Result<()>;
    }
}

mock! {
    pub Warehouse {}

    #[async_trait]
    impl WarehouseApi for Warehouse {
        async fn get_stock(&self, product_id: Uuid) -> Result<StockInfo>;
        async fn get_stock_batch(&self, product_ids: &[Uuid]) -> Result<Vec<StockInfo>>;
    }
}

/// Warehouse that never answers within any sane timeout.
pub struct HangingWarehouse;

#[async_trait]
impl WarehouseApi for HangingWarehouse {
    async fn get_stock(&self, _product_id: Uuid) -> Result<StockInfo> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("hanging warehouse answered")
    }

    async fn get_stock_batch(&self, _product_ids: &[Uuid]) -> Result<Vec<StockInfo>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("hanging warehouse answered")
    }
}

/// Short timeouts, no jitter, breaker that trips after five failures.
pub fn fast_policy(max_retries: u32) -> ResiliencePolicy {
    ResiliencePolicy {
        timeout: Duration::from_millis(500),
        retry: RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            jitter_max: Duration::ZERO,
        },
        circuit_breaker: CircuitBreakerPolicy {
            failure_ratio: 0.5,
            sampling_window: Duration::from_secs(30),
            minimum_throughput: 5,
            break_duration: Duration::from_secs(30),
        },
    }
}

pub fn erp_product(id: Uuid) -> ErpProduct {
    ErpProduct {
        id,
        sku: format!("SKU-{}", &id.to_string()[..8]),
        name: "Test Widget".to_string(),
        description: Some("A widget for tests".to_string()),
        price: dec!(19.99),
        category: Some("widgets".to_string()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn new_product() -> NewProduct {
    NewProduct {
        sku: "SKU-NEW-1".to_string(),
        name: "New Widget".to_string(),
        description: None,
        price: dec!(5.00),
        category: None,
    }
}

pub fn idempotency_key() -> String {
    format!("test-{}", Uuid::new_v4())
}

pub struct TestApp {
    pub router: Router,
    pub service: Arc<ProductService>,
    pub coordinator: Arc<IdempotencyCoordinator>,
    pub erp_call: Arc<ResilientCall>,
    pub warehouse_call: Arc<ResilientCall>,
}

pub fn build_service(
    erp: Arc<dyn ErpApi>,
    warehouse: Arc<dyn WarehouseApi>,
    policy: ResiliencePolicy,
) -> (Arc<ProductService>, Arc<ResilientCall>, Arc<ResilientCall>) {
    let erp_call = Arc::new(ResilientCall::new("erp", policy.clone()));
    let warehouse_call = Arc::new(ResilientCall::new("warehouse", policy));
    let cache = Arc::new(ResponseCache::new(CacheSettings::default()));
    let service = Arc::new(ProductService::new(
        erp,
        warehouse,
        erp_call.clone(),
        warehouse_call.clone(),
        cache,
    ));
    (service, erp_call, warehouse_call)
}

pub fn test_app(erp: Arc<dyn ErpApi>, warehouse: Arc<dyn WarehouseApi>) -> TestApp {
    let (service, erp_call, warehouse_call) = build_service(erp, warehouse, fast_policy(0));
    let coordinator = Arc::new(IdempotencyCoordinator::new(IdempotencySettings::default()));
    let health_checker = Arc::new(HealthChecker::new(erp_call.clone(), warehouse_call.clone()));
    let state = AppState::new(service.clone(), coordinator.clone(), health_checker);

    TestApp {
        router: create_router(state),
        service,
        coordinator,
        erp_call,
        warehouse_call,
    }
}
