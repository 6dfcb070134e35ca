pub mod product;
pub mod stock;

pub use product::{
    describe_errors, ErpProduct, ErpProductPage, NewProduct, Product, ProductPage, ProductUpdate,
    ValidationError,
};
pub use stock::StockInfo;
