use crate::cache::ResponseCache;
use crate::error::{AppError, Result};
use crate::models::{
    describe_errors, ErpProduct, NewProduct, Product, ProductPage, ProductUpdate, StockInfo,
};
use crate::resilience::{CircuitState, Fallback, ResilientCall};
use crate::upstream::{ErpApi, WarehouseApi};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const MAX_PAGE_SIZE: u32 = 100;

/// Prefix shared by every cached product page.
pub const LIST_KEY_PREFIX: &str = "products:list:";

pub fn product_key(id: Uuid) -> String {
    format!("products:{}", id)
}

pub fn list_key(page: u32, page_size: u32) -> String {
    format!("{}{}:{}", LIST_KEY_PREFIX, page, page_size)
}

/// Circuit state of one upstream, as reported by the detailed health check.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyCircuit {
    pub name: String,
    pub state: CircuitState,
}

/// Product API orchestration over the ERP and the warehouse.
///
/// Reads are cache-aside. ERP failures always reach the caller; warehouse
/// failures on reads are replaced by unavailable stock. Writes go to the ERP
/// only and invalidate the affected cache entries once they succeed.
pub struct ProductService {
    erp: Arc<dyn ErpApi>,
    warehouse: Arc<dyn WarehouseApi>,
    erp_call: Arc<ResilientCall>,
    warehouse_call: Arc<ResilientCall>,
    cache: Arc<ResponseCache>,
}

impl ProductService {
    pub fn new(
        erp: Arc<dyn ErpApi>,
        warehouse: Arc<dyn WarehouseApi>,
        erp_call: Arc<ResilientCall>,
        warehouse_call: Arc<ResilientCall>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            erp,
            warehouse,
            erp_call,
            warehouse_call,
            cache,
        }
    }

    /// Returns the cache instance for stats access.
    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    pub fn circuit_states(&self) -> Vec<DependencyCircuit> {
        [&self.erp_call, &self.warehouse_call]
            .into_iter()
            .map(|call| DependencyCircuit {
                name: call.name().to_string(),
                state: call.circuit_state(),
            })
            .collect()
    }

    /// Gets a product with its stock level.
    pub async fn get_product(&self, id: Uuid, cancel: &CancellationToken) -> Result<Product> {
        let key = product_key(id);
        if let Some(cached) = self.cache.get::<Product>(&key) {
            return Ok(cached);
        }

        let erp = self.erp.as_ref();
        let warehouse = self.warehouse.as_ref();

        let (product, stock) = tokio::join!(
            self.erp_call
                .execute(move || erp.get_product(id), Fallback::Propagate, cancel),
            self.warehouse_call.execute(
                move || warehouse.get_stock(id),
                Fallback::DefaultValue(StockInfo::unavailable(id)),
                cancel,
            ),
        );

        let product = product?;
        // A warehouse that does not know the product is not an error for the read.
        let stock = match stock {
            Err(e) if e.is_not_found() => StockInfo::unavailable(id),
            other => other?,
        };
        let product = Product::merge(product, stock);
        let ttl = self.ttl_for(self.cache.settings().product_ttl(), !product.stock.available);
        self.store(&key, &product, ttl);

        Ok(product)
    }

    /// Lists one page of products with stock levels.
    pub async fn list_products(
        &self,
        page: u32,
        page_size: u32,
        cancel: &CancellationToken,
    ) -> Result<ProductPage> {
        if page == 0 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let key = list_key(page, page_size);
        if let Some(cached) = self.cache.get::<ProductPage>(&key) {
            return Ok(cached);
        }

        let erp = self.erp.as_ref();
        let warehouse = self.warehouse.as_ref();

        let erp_page = self
            .erp_call
            .execute(
                move || erp.list_products(page, page_size),
                Fallback::Propagate,
                cancel,
            )
            .await?;

        let ids: Vec<Uuid> = erp_page.items.iter().map(|p| p.id).collect();
        let ids = ids.as_slice();
        let stock = self
            .warehouse_call
            .execute(
                move || warehouse.get_stock_batch(ids),
                Fallback::DefaultValue(Vec::new()),
                cancel,
            )
            .await;

        let stock = match stock {
            Err(e) if e.is_not_found() => Vec::new(),
            other => other?,
        };
        let page = ProductPage::merge(erp_page, stock);
        let degraded = page.items.iter().any(|p| !p.stock.available);
        let ttl = self.ttl_for(self.cache.settings().list_ttl(), degraded);
        self.store(&key, &page, ttl);

        Ok(page)
    }

    /// Creates a product in the ERP.
    pub async fn create_product(
        &self,
        product: &NewProduct,
        cancel: &CancellationToken,
    ) -> Result<ErpProduct> {
        product
            .validate()
            .map_err(|errors| AppError::Validation(describe_errors(&errors)))?;

        let erp = self.erp.as_ref();
        let created = self
            .erp_call
            .execute(move || erp.create_product(product), Fallback::Propagate, cancel)
            .await?;

        self.cache.remove_by_pattern(LIST_KEY_PREFIX);

        tracing::info!(product_id = %created.id, sku = %created.sku, "Product created");
        Ok(created)
    }

    /// Applies a partial update to a product in the ERP.
    pub async fn update_product(
        &self,
        id: Uuid,
        update: &ProductUpdate,
        cancel: &CancellationToken,
    ) -> Result<ErpProduct> {
        update
            .validate()
            .map_err(|errors| AppError::Validation(describe_errors(&errors)))?;

        let erp = self.erp.as_ref();
        let updated = self
            .erp_call
            .execute(move || erp.update_product(id, update), Fallback::Propagate, cancel)
            .await?;

        self.invalidate_product(id);

        tracing::info!(product_id = %id, "Product updated");
        Ok(updated)
    }

    /// Deletes a product from the ERP.
    pub async fn delete_product(&self, id: Uuid, cancel: &CancellationToken) -> Result<()> {
        let erp = self.erp.as_ref();
        self.erp_call
            .execute(move || erp.delete_product(id), Fallback::Propagate, cancel)
            .await?;

        self.invalidate_product(id);

        tracing::info!(product_id = %id, "Product deleted");
        Ok(())
    }

    fn invalidate_product(&self, id: Uuid) {
        self.cache.remove(&product_key(id));
        self.cache.remove_by_pattern(LIST_KEY_PREFIX);
    }

    /// Placeholder stock is only cached briefly so a recovered warehouse shows through.
    fn ttl_for(&self, ttl: std::time::Duration, degraded: bool) -> std::time::Duration {
        if degraded {
            ttl.min(self.cache.settings().degraded_ttl())
        } else {
            ttl
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T, ttl: std::time::Duration) {
        if let Err(e) = self.cache.set(key, value, ttl) {
            tracing::warn!(key = %key, "Failed to cache response: {}", e);
        }
    }
}
