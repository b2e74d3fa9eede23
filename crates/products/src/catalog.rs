//! Grouped catalog view rebuilt from independently read relations.
//!
//! Products, links and availability records arrive as three flat sequences.
//! They are joined here with hash-map grouping keyed by product id, so the
//! storage layer never needs a multi-way join.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use stockroom_core::{CategoryId, ProductId};
use stockroom_inventory::{AvailabilityRecord, StockLevel, allocation_order};

use crate::link::ProductCategoryLink;
use crate::product::Product;

/// A product with its per-store availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    pub availability: Vec<StockLevel>,
}

/// Products sharing one category key.
///
/// `category_id` is `None` for the uncategorized bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub category_id: Option<CategoryId>,
    pub products: Vec<CatalogProduct>,
}

/// Outer join of products against availability records.
///
/// Every product is kept, in input order; a product without records gets an
/// empty availability list. Records of unknown products are dropped.
pub fn products_with_availability(
    products: Vec<Product>,
    records: Vec<AvailabilityRecord>,
) -> Vec<CatalogProduct> {
    let mut by_product: HashMap<ProductId, Vec<AvailabilityRecord>> = HashMap::new();
    for record in records {
        by_product.entry(record.product_id).or_default().push(record);
    }

    products
        .into_iter()
        .map(|product| {
            let mut rows = by_product.remove(&product.id).unwrap_or_default();
            rows.sort_by(allocation_order);
            CatalogProduct {
                id: product.id,
                name: product.name,
                availability: rows.iter().map(AvailabilityRecord::stock_level).collect(),
            }
        })
        .collect()
}

/// Group the catalog by category.
///
/// A product appears once per category it is linked to, or exactly once in
/// the `None` bucket when it has no link. Groups are ordered ascending by
/// key with `None` first.
pub fn group_by_category(
    products: Vec<Product>,
    links: Vec<ProductCategoryLink>,
    records: Vec<AvailabilityRecord>,
) -> Vec<CategoryGroup> {
    let mut categories_of: HashMap<ProductId, Vec<CategoryId>> = HashMap::new();
    for link in links {
        categories_of
            .entry(link.product_id)
            .or_default()
            .push(link.category_id);
    }

    let mut groups: BTreeMap<Option<CategoryId>, Vec<CatalogProduct>> = BTreeMap::new();
    for product in products_with_availability(products, records) {
        match categories_of.get_mut(&product.id) {
            Some(category_ids) => {
                category_ids.sort();
                category_ids.dedup();
                for category_id in category_ids.iter() {
                    groups
                        .entry(Some(*category_id))
                        .or_default()
                        .push(product.clone());
                }
            }
            None => groups.entry(None).or_default().push(product),
        }
    }

    groups
        .into_iter()
        .map(|(category_id, products)| CategoryGroup {
            category_id,
            products,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_core::{AvailabilityId, StoreId};
    use uuid::Uuid;

    fn product(n: u128, name: &str) -> Product {
        Product::new(ProductId::from_uuid(Uuid::from_u128(n)), name)
    }

    fn category(n: u128) -> CategoryId {
        CategoryId::from_uuid(Uuid::from_u128(n))
    }

    fn store(n: u128) -> StoreId {
        StoreId::from_uuid(Uuid::from_u128(n))
    }

    fn record(product_id: ProductId, store_id: StoreId, quantity: i64) -> AvailabilityRecord {
        AvailabilityRecord::new(AvailabilityId::new(), product_id, store_id, quantity, Utc::now())
            .unwrap()
    }

    #[test]
    fn unstocked_product_keeps_empty_availability() {
        let kettle = product(1, "Kettle");
        let view = products_with_availability(vec![kettle.clone()], Vec::new());
        assert_eq!(
            view,
            vec![CatalogProduct {
                id: kettle.id,
                name: "Kettle".to_string(),
                availability: Vec::new(),
            }]
        );
    }

    #[test]
    fn availability_is_listed_per_store_in_store_order() {
        let kettle = product(1, "Kettle");
        let records = vec![
            record(kettle.id, store(2), 3),
            record(kettle.id, store(1), 5),
            record(kettle.id, store(2), 1),
        ];

        let view = products_with_availability(vec![kettle], records);
        let levels: Vec<_> = view[0]
            .availability
            .iter()
            .map(|l| (l.store_id, l.quantity))
            .collect();
        assert_eq!(levels, vec![(store(1), 5), (store(2), 3), (store(2), 1)]);
    }

    #[test]
    fn uncategorized_bucket_sorts_first_and_holds_each_product_once() {
        let kettle = product(1, "Kettle");
        let toaster = product(2, "Toaster");
        let lamp = product(3, "Lamp");
        let links = vec![
            ProductCategoryLink::new(toaster.id, category(20)),
            ProductCategoryLink::new(toaster.id, category(10)),
        ];

        let groups = group_by_category(vec![kettle.clone(), toaster.clone(), lamp.clone()], links, Vec::new());

        let keys: Vec<_> = groups.iter().map(|g| g.category_id).collect();
        assert_eq!(keys, vec![None, Some(category(10)), Some(category(20))]);

        let uncategorized: Vec<_> = groups[0].products.iter().map(|p| p.id).collect();
        assert_eq!(uncategorized, vec![kettle.id, lamp.id]);

        // Toaster shows up under each of its categories and nowhere else.
        assert_eq!(groups[1].products.len(), 1);
        assert_eq!(groups[1].products[0].id, toaster.id);
        assert_eq!(groups[2].products[0].id, toaster.id);
    }

    #[test]
    fn no_uncategorized_bucket_when_every_product_is_linked() {
        let kettle = product(1, "Kettle");
        let groups = group_by_category(
            vec![kettle.clone()],
            vec![ProductCategoryLink::new(kettle.id, category(7))],
            vec![record(kettle.id, store(1), 2)],
        );

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].category_id, Some(category(7)));
        assert_eq!(groups[0].products[0].availability.len(), 1);
    }

    #[test]
    fn links_to_unknown_products_are_ignored() {
        let groups = group_by_category(
            Vec::new(),
            vec![ProductCategoryLink::new(ProductId::new(), category(1))],
            Vec::new(),
        );
        assert!(groups.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                .. ProptestConfig::default()
            })]

            /// Each product lands in one group per distinct category, or once in `None`.
            #[test]
            fn every_product_is_placed_once_per_category(
                memberships in proptest::collection::vec(
                    proptest::collection::vec(0u128..5, 0..4),
                    1..20,
                ),
            ) {
                let products: Vec<Product> = (0..memberships.len())
                    .map(|i| product(i as u128 + 1, "p"))
                    .collect();
                let links: Vec<ProductCategoryLink> = products
                    .iter()
                    .zip(&memberships)
                    .flat_map(|(p, cats)| {
                        cats.iter().map(|c| ProductCategoryLink::new(p.id, category(100 + c)))
                    })
                    .collect();

                let groups = group_by_category(products.clone(), links, Vec::new());

                let keys: Vec<_> = groups.iter().map(|g| g.category_id).collect();
                let mut sorted = keys.clone();
                sorted.sort();
                prop_assert_eq!(&keys, &sorted);

                for (p, cats) in products.iter().zip(&memberships) {
                    let distinct: HashSet<_> = cats.iter().collect();
                    let placements = groups
                        .iter()
                        .map(|g| g.products.iter().filter(|cp| cp.id == p.id).count())
                        .sum::<usize>();
                    prop_assert_eq!(placements, distinct.len().max(1));
                }
            }
        }
    }
}
