//! Document models.

pub mod product;

pub use product::{CategoryStats, NewProduct, ProductPatch, ValidationError};
