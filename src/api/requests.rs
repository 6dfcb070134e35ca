use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Query parameters for listing products.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListProductsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListProductsQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}
