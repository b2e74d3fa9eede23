//! Products domain module.
//!
//! Catalog entities (products, categories, their links) and the in-process
//! reconstruction of the grouped catalog view. Pure, deterministic logic
//! (no IO, no HTTP, no storage).

pub mod catalog;
pub mod category;
pub mod link;
pub mod product;

pub use catalog::{CatalogProduct, CategoryGroup, group_by_category, products_with_availability};
pub use category::Category;
pub use link::{ProductCategoryLink, check_link, check_unlink};
pub use product::Product;
