use std::collections::{BTreeMap, HashMap};

use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use stockroom_core::{CategoryId, ProductId, StoreId};
use stockroom_inventory::StockLevel;
use stockroom_products::{CatalogProduct, Category, CategoryGroup};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    /// Product id (string) to quantity.
    pub products: HashMap<String, i64>,
}

impl RestockRequest {
    /// Parse every key into a product id. A malformed key, or two keys naming
    /// the same product, fails the request.
    pub fn into_quantities(self) -> Result<BTreeMap<ProductId, i64>, Response> {
        let mut quantities = BTreeMap::new();
        for (raw, qty) in self.products {
            let product_id = errors::parse_id::<ProductId>(&raw, "product")?;
            if quantities.insert(product_id, qty).is_some() {
                return Err(errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "duplicate_product",
                    format!("product {product_id} is listed more than once"),
                ));
            }
        }
        Ok(quantities)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    pub id: CategoryId,
    pub name: String,
}

impl From<Category> for CategoryResponse {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub store_id: StoreId,
    pub availability: i64,
}

impl From<StockLevel> for AvailabilityResponse {
    fn from(level: StockLevel) -> Self {
        Self {
            store_id: level.store_id,
            availability: level.quantity,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub availability: Vec<AvailabilityResponse>,
}

impl From<CatalogProduct> for ProductResponse {
    fn from(p: CatalogProduct) -> Self {
        Self {
            id: p.id,
            name: p.name,
            availability: p.availability.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGroupResponse {
    /// `null` for products without a category.
    pub category_id: Option<CategoryId>,
    pub products: Vec<ProductResponse>,
}

impl From<CategoryGroup> for CategoryGroupResponse {
    fn from(g: CategoryGroup) -> Self {
        Self {
            category_id: g.category_id,
            products: g.products.into_iter().map(Into::into).collect(),
        }
    }
}
