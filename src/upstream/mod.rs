//! Clients for the two upstream services behind the gateway.
//!
//! The ERP is the system of record for product data. The warehouse only
//! reports stock levels and may be missing from a response without failing it.

pub mod erp_client;
pub mod warehouse_client;

use crate::error::{AppError, Result};
use crate::models::{ErpProduct, ErpProductPage, NewProduct, ProductUpdate, StockInfo};
use async_trait::async_trait;
use uuid::Uuid;

pub use erp_client::ErpClient;
pub use warehouse_client::WarehouseClient;

pub const ERP: &str = "erp";
pub const WAREHOUSE: &str = "warehouse";

/// Product operations offered by the ERP.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ErpApi: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<ErpProduct>;
    async fn list_products(&self, page: u32, page_size: u32) -> Result<ErpProductPage>;
    async fn create_product(&self, product: &NewProduct) -> Result<ErpProduct>;
    async fn update_product(&self, id: Uuid, update: &ProductUpdate) -> Result<ErpProduct>;
    async fn delete_product(&self, id: Uuid) -> Result<()>;
}

/// Stock lookups offered by the warehouse.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WarehouseApi: Send + Sync {
    async fn get_stock(&self, product_id: Uuid) -> Result<StockInfo>;
    async fn get_stock_batch(&self, product_ids: &[Uuid]) -> Result<Vec<StockInfo>>;
}

/// Maps a non-success status to the matching error, passing successes through.
pub(crate) fn check_status(
    dependency: &str,
    resource: impl FnOnce() -> String,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(resource()));
    }

    tracing::debug!(dependency = %dependency, status = status.as_u16(), "Upstream returned error status");
    Err(AppError::Upstream {
        dependency: dependency.to_string(),
        status: status.as_u16(),
    })
}

pub(crate) fn build_http_client(connect_timeout: std::time::Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(10)
        .user_agent(concat!("product-gateway/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
