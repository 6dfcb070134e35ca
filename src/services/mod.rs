pub mod product_service;

pub use product_service::{DependencyCircuit, ProductService};
