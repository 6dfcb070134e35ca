use super::{build_http_client, check_status, ErpApi, ERP};
use crate::error::Result;
use crate::models::{ErpProduct, ErpProductPage, NewProduct, ProductUpdate};
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// HTTP client for the ERP product API.
#[derive(Debug, Clone)]
pub struct ErpClient {
    client: reqwest::Client,
    base_url: String,
}

impl ErpClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Duration::from_secs(2))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn product_url(&self, id: Uuid) -> String {
        format!("{}/products/{}", self.base_url, id)
    }
}

#[async_trait]
impl ErpApi for ErpClient {
    async fn get_product(&self, id: Uuid) -> Result<ErpProduct> {
        let response = self.client.get(self.product_url(id)).send().await?;
        let response = check_status(ERP, || format!("product {}", id), response)?;
        Ok(response.json().await?)
    }

    async fn list_products(&self, page: u32, page_size: u32) -> Result<ErpProductPage> {
        let response = self
            .client
            .get(format!("{}/products", self.base_url))
            .query(&[("page", page), ("page_size", page_size)])
            .send()
            .await?;
        let response = check_status(ERP, || "product list".to_string(), response)?;
        Ok(response.json().await?)
    }

    async fn create_product(&self, product: &NewProduct) -> Result<ErpProduct> {
        let response = self
            .client
            .post(format!("{}/products", self.base_url))
            .json(product)
            .send()
            .await?;
        let response = check_status(ERP, || "product collection".to_string(), response)?;
        Ok(response.json().await?)
    }

    async fn update_product(&self, id: Uuid, update: &ProductUpdate) -> Result<ErpProduct> {
        let response = self
            .client
            .put(self.product_url(id))
            .json(update)
            .send()
            .await?;
        let response = check_status(ERP, || format!("product {}", id), response)?;
        Ok(response.json().await?)
    }

    async fn delete_product(&self, id: Uuid) -> Result<()> {
        let response = self.client.delete(self.product_url(id)).send().await?;
        check_status(ERP, || format!("product {}", id), response)?;
        Ok(())
    }
}
