use tracing::{debug, instrument};

use stockroom_core::CategoryId;
use stockroom_products::{
    CatalogProduct, Category, CategoryGroup, group_by_category, products_with_availability,
};

use super::{OperationError, StockOperations, settle};
use crate::ledger::{IsolationLevel, LedgerStore, LedgerTx};

impl<S: LedgerStore> StockOperations<S> {
    /// Every product with its availability, grouped by category.
    ///
    /// The uncategorized group (`category_id == None`) comes first.
    #[instrument(skip(self), err)]
    pub async fn all_products(&self) -> Result<Vec<CategoryGroup>, OperationError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let outcome = all_products_in(&mut tx).await;
        let groups = settle(tx, outcome).await?;
        debug!(groups = groups.len(), "catalog assembled");
        Ok(groups)
    }

    /// Products linked to one category. An unknown category has no products.
    #[instrument(skip(self), fields(category_id = %category_id), err)]
    pub async fn products_by_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<CatalogProduct>, OperationError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let outcome = products_by_category_in(&mut tx, category_id).await;
        settle(tx, outcome).await
    }

    #[instrument(skip(self), err)]
    pub async fn categories(&self) -> Result<Vec<Category>, OperationError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let outcome = tx.categories().await.map_err(OperationError::from);
        settle(tx, outcome).await
    }
}

async fn all_products_in<Tx: LedgerTx>(tx: &mut Tx) -> Result<Vec<CategoryGroup>, OperationError> {
    let products = tx.products().await?;
    let links = tx.links().await?;
    let records = tx.availability().await?;
    debug!(
        products = products.len(),
        links = links.len(),
        records = records.len(),
        "catalog relations loaded"
    );
    Ok(group_by_category(products, links, records))
}

async fn products_by_category_in<Tx: LedgerTx>(
    tx: &mut Tx,
    category_id: CategoryId,
) -> Result<Vec<CatalogProduct>, OperationError> {
    let ids: Vec<_> = tx
        .links_in_category(category_id)
        .await?
        .into_iter()
        .map(|link| link.product_id)
        .collect();
    let products = tx.products_by_ids(&ids).await?;

    let mut records = Vec::new();
    for product in &products {
        records.extend(tx.availability_of(product.id).await?);
    }
    Ok(products_with_availability(products, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_core::{AvailabilityId, ProductId, StoreId};
    use stockroom_inventory::{AvailabilityRecord, StockLevel};
    use stockroom_products::{Product, ProductCategoryLink};
    use uuid::Uuid;

    use crate::ledger::InMemoryLedgerStore;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    struct Catalog {
        ledger: InMemoryLedgerStore,
        kettle: ProductId,
        toaster: ProductId,
        lamp: ProductId,
        kitchen: CategoryId,
        lighting: CategoryId,
        north: StoreId,
        south: StoreId,
    }

    /// Kettle in kitchen, toaster in kitchen and lighting, lamp uncategorized
    /// and never stocked.
    fn catalog() -> Catalog {
        let ledger = InMemoryLedgerStore::new();
        let kettle = ProductId::from_uuid(id(1));
        let toaster = ProductId::from_uuid(id(2));
        let lamp = ProductId::from_uuid(id(3));
        let kitchen = CategoryId::from_uuid(id(10));
        let lighting = CategoryId::from_uuid(id(11));
        let north = StoreId::from_uuid(id(20));
        let south = StoreId::from_uuid(id(21));

        for (pid, name) in [(kettle, "Kettle"), (toaster, "Toaster"), (lamp, "Lamp")] {
            ledger.seed_product(Product::new(pid, name)).unwrap();
        }
        ledger.seed_category(Category::new(kitchen, "Kitchen")).unwrap();
        ledger.seed_category(Category::new(lighting, "Lighting")).unwrap();
        ledger.seed_link(ProductCategoryLink::new(kettle, kitchen)).unwrap();
        ledger.seed_link(ProductCategoryLink::new(toaster, kitchen)).unwrap();
        ledger.seed_link(ProductCategoryLink::new(toaster, lighting)).unwrap();

        for (pid, sid, qty) in [(kettle, south, 2), (kettle, north, 5), (toaster, north, 1)] {
            ledger
                .seed_availability(
                    AvailabilityRecord::new(AvailabilityId::new(), pid, sid, qty, Utc::now()).unwrap(),
                )
                .unwrap();
        }

        Catalog {
            ledger,
            kettle,
            toaster,
            lamp,
            kitchen,
            lighting,
            north,
            south,
        }
    }

    #[tokio::test]
    async fn all_products_groups_with_uncategorized_first() {
        let c = catalog();
        let ops = StockOperations::new(c.ledger.clone());

        let groups = ops.all_products().await.unwrap();
        let keys: Vec<_> = groups.iter().map(|g| g.category_id).collect();
        assert_eq!(keys, vec![None, Some(c.kitchen), Some(c.lighting)]);

        let uncategorized = &groups[0].products;
        assert_eq!(uncategorized.len(), 1);
        assert_eq!(uncategorized[0].id, c.lamp);
        assert!(uncategorized[0].availability.is_empty());

        let kitchen: Vec<_> = groups[1].products.iter().map(|p| p.id).collect();
        assert_eq!(kitchen, vec![c.kettle, c.toaster]);
        assert_eq!(
            groups[1].products[0].availability,
            vec![
                StockLevel {
                    store_id: c.north,
                    quantity: 5
                },
                StockLevel {
                    store_id: c.south,
                    quantity: 2
                },
            ]
        );

        let lighting: Vec<_> = groups[2].products.iter().map(|p| p.id).collect();
        assert_eq!(lighting, vec![c.toaster]);
    }

    #[tokio::test]
    async fn products_by_category_lists_linked_products_only() {
        let c = catalog();
        let ops = StockOperations::new(c.ledger.clone());

        let lighting = ops.products_by_category(c.lighting).await.unwrap();
        assert_eq!(lighting.len(), 1);
        assert_eq!(lighting[0].id, c.toaster);
        assert_eq!(lighting[0].name, "Toaster");
        assert_eq!(lighting[0].availability.len(), 1);

        let unknown = ops.products_by_category(CategoryId::new()).await.unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn categories_are_listed_by_id() {
        let c = catalog();
        let ops = StockOperations::new(c.ledger.clone());

        let names: Vec<_> = ops
            .categories()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Kitchen", "Lighting"]);
    }

    #[tokio::test]
    async fn booking_is_reflected_in_the_catalog() {
        let c = catalog();
        let ops = StockOperations::new(c.ledger.clone());

        ops.book(c.kettle, 6).await.unwrap();
        let kitchen = ops.products_by_category(c.kitchen).await.unwrap();
        let kettle = kitchen.iter().find(|p| p.id == c.kettle).unwrap();
        let quantities: Vec<_> = kettle.availability.iter().map(|l| l.quantity).collect();
        assert_eq!(quantities, vec![0, 1]);
    }
}
