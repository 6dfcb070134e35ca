use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stock::StockInfo;

/// Product as held by the ERP, the system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpProduct {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of ERP products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpProductPage {
    pub items: Vec<ErpProduct>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

/// Product returned by the gateway: ERP data merged with warehouse stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: Option<String>,
    pub stock: StockInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Merges an ERP product with its stock. Stock for another product is
    /// ignored in favour of an unavailable placeholder.
    pub fn merge(erp: ErpProduct, stock: StockInfo) -> Self {
        let stock = if stock.product_id == erp.id {
            stock
        } else {
            StockInfo::unavailable(erp.id)
        };

        Self {
            id: erp.id,
            sku: erp.sku,
            name: erp.name,
            description: erp.description,
            price: erp.price,
            category: erp.category,
            stock,
            created_at: erp.created_at,
            updated_at: erp.updated_at,
        }
    }
}

/// Page of merged products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl ProductPage {
    /// Joins an ERP page with warehouse stock by product id. Products the
    /// warehouse did not report get an unavailable placeholder.
    pub fn merge(erp: ErpProductPage, stock: Vec<StockInfo>) -> Self {
        let mut by_id: std::collections::HashMap<Uuid, StockInfo> =
            stock.into_iter().map(|s| (s.product_id, s)).collect();

        let items = erp
            .items
            .into_iter()
            .map(|product| {
                let stock = by_id
                    .remove(&product.id)
                    .unwrap_or_else(|| StockInfo::unavailable(product.id));
                Product::merge(product, stock)
            })
            .collect();

        Self {
            items,
            page: erp.page,
            page_size: erp.page_size,
            total: erp.total,
        }
    }
}

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Joins validation failures into a single message.
pub fn describe_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Payload for creating a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: Option<String>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.sku.trim().is_empty() {
            errors.push(ValidationError::new("sku", "sku cannot be empty"));
        }
        if self.sku.len() > 64 {
            errors.push(ValidationError::new("sku", "sku must be at most 64 characters"));
        }
        if self.name.trim().is_empty() {
            errors.push(ValidationError::new("name", "name cannot be empty"));
        }
        if self.price < Decimal::ZERO {
            errors.push(ValidationError::new("price", "price cannot be negative"));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Partial update of a product. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.category.is_none()
    }

    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.is_empty() {
            errors.push(ValidationError::new("body", "at least one field must be provided"));
        }
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            errors.push(ValidationError::new("name", "name cannot be empty"));
        }
        if matches!(self.price, Some(price) if price < Decimal::ZERO) {
            errors.push(ValidationError::new("price", "price cannot be negative"));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
