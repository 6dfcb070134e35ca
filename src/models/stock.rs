use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn reported() -> bool {
    true
}

/// Stock level reported by the warehouse.
///
/// `available` is false for placeholders built when the warehouse could not
/// be asked; such entries always report zero quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockInfo {
    pub product_id: Uuid,
    pub quantity: i64,
    pub in_stock: bool,
    #[serde(default)]
    pub warehouse_location: Option<String>,
    #[serde(default = "reported")]
    pub available: bool,
}

impl StockInfo {
    pub fn new(product_id: Uuid, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            in_stock: quantity > 0,
            warehouse_location: None,
            available: true,
        }
    }

    pub fn unavailable(product_id: Uuid) -> Self {
        Self {
            product_id,
            quantity: 0,
            in_stock: false,
            warehouse_location: None,
            available: false,
        }
    }
}
