//! Product ↔ category association and its validation rules.

use serde::{Deserialize, Serialize};

use stockroom_core::{CategoryId, ProductId, Rejection, Rejections};

use crate::category::Category;
use crate::product::Product;

/// Membership of one product in one category. At most one per pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductCategoryLink {
    pub product_id: ProductId,
    pub category_id: CategoryId,
}

impl ProductCategoryLink {
    pub fn new(product_id: ProductId, category_id: CategoryId) -> Self {
        Self {
            product_id,
            category_id,
        }
    }
}

fn missing_entities(product: Option<&Product>, category: Option<&Category>) -> Vec<Rejection> {
    let mut rejections = Vec::new();
    if product.is_none() {
        rejections.push(Rejection::ProductNotFound);
    }
    if category.is_none() {
        rejections.push(Rejection::CategoryNotFound);
    }
    rejections
}

/// Validate a link request. Collects every failing check.
pub fn check_link(
    product: Option<&Product>,
    category: Option<&Category>,
    existing: Option<&ProductCategoryLink>,
) -> Result<(), Rejections> {
    let mut rejections = missing_entities(product, category);
    if existing.is_some() {
        rejections.push(Rejection::AlreadyLinked);
    }
    Rejections::check(rejections)
}

/// Validate an unlink request. Collects every failing check.
pub fn check_unlink(
    product: Option<&Product>,
    category: Option<&Category>,
    existing: Option<&ProductCategoryLink>,
) -> Result<(), Rejections> {
    let mut rejections = missing_entities(product, category);
    if existing.is_none() {
        rejections.push(Rejection::NotLinked);
    }
    Rejections::check(rejections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> (Product, Category, ProductCategoryLink) {
        let product = Product::new(ProductId::new(), "Kettle");
        let category = Category::new(CategoryId::new(), "Kitchen");
        let link = ProductCategoryLink::new(product.id, category.id);
        (product, category, link)
    }

    #[test]
    fn link_passes_for_fresh_pair() {
        let (product, category, _) = fixtures();
        assert!(check_link(Some(&product), Some(&category), None).is_ok());
    }

    #[test]
    fn link_reports_all_reasons_together() {
        let (_, _, link) = fixtures();
        let err = check_link(None, None, Some(&link)).unwrap_err();
        assert_eq!(
            err.into_vec(),
            vec![
                Rejection::ProductNotFound,
                Rejection::CategoryNotFound,
                Rejection::AlreadyLinked,
            ]
        );
    }

    #[test]
    fn link_refuses_duplicate() {
        let (product, category, link) = fixtures();
        let err = check_link(Some(&product), Some(&category), Some(&link)).unwrap_err();
        assert_eq!(err.into_vec(), vec![Rejection::AlreadyLinked]);
    }

    #[test]
    fn unlink_requires_existing_link() {
        let (product, category, _) = fixtures();
        let err = check_unlink(Some(&product), Some(&category), None).unwrap_err();
        assert_eq!(err.into_vec(), vec![Rejection::NotLinked]);
    }

    #[test]
    fn unlink_reports_missing_category_and_link() {
        let (product, _, _) = fixtures();
        let err = check_unlink(Some(&product), None, None).unwrap_err();
        assert_eq!(err.to_string(), "category does not exist; product is not in the category");
    }
}
