use super::{build_http_client, check_status, WarehouseApi, WAREHOUSE};
use crate::error::Result;
use crate::models::StockInfo;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Serialize)]
struct StockBatchRequest<'a> {
    product_ids: &'a [Uuid],
}

/// HTTP client for the warehouse stock API.
#[derive(Debug, Clone)]
pub struct WarehouseClient {
    client: reqwest::Client,
    base_url: String,
}

impl WarehouseClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Duration::from_secs(1))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl WarehouseApi for WarehouseClient {
    async fn get_stock(&self, product_id: Uuid) -> Result<StockInfo> {
        let response = self
            .client
            .get(format!("{}/stock/{}", self.base_url, product_id))
            .send()
            .await?;
        let response = check_status(WAREHOUSE, || format!("stock for {}", product_id), response)?;
        Ok(response.json().await?)
    }

    async fn get_stock_batch(&self, product_ids: &[Uuid]) -> Result<Vec<StockInfo>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/stock/batch", self.base_url))
            .json(&StockBatchRequest { product_ids })
            .send()
            .await?;
        let response = check_status(WAREHOUSE, || "stock batch".to_string(), response)?;
        Ok(response.json().await?)
    }
}
