use std::collections::BTreeMap;

use anyhow::Context;
use chrono::Utc;

use stockroom_core::{AvailabilityId, CategoryId, ProductId, StoreId};
use stockroom_infra::{
    AppConfig, Backend, BookingReceipt, InMemoryLedgerStore, LedgerError, OperationError,
    PgLedgerStore, RestockReport, StockOperations,
};
use stockroom_inventory::{AvailabilityRecord, Store};
use stockroom_products::{CatalogProduct, Category, CategoryGroup, Product, ProductCategoryLink};

/// Operations handle shared by every handler, over whichever backend was configured.
#[derive(Debug, Clone)]
pub enum AppServices {
    InMemory(StockOperations<InMemoryLedgerStore>),
    Postgres(StockOperations<PgLedgerStore>),
}

macro_rules! with_ops {
    ($services:expr, $ops:ident => $body:expr) => {
        match $services {
            AppServices::InMemory($ops) => $body,
            AppServices::Postgres($ops) => $body,
        }
    };
}

impl AppServices {
    pub fn in_memory(ledger: InMemoryLedgerStore) -> Self {
        AppServices::InMemory(StockOperations::new(ledger))
    }

    pub fn postgres(ledger: PgLedgerStore) -> Self {
        AppServices::Postgres(StockOperations::new(ledger))
    }

    pub async fn categories(&self) -> Result<Vec<Category>, OperationError> {
        with_ops!(self, ops => ops.categories().await)
    }

    pub async fn all_products(&self) -> Result<Vec<CategoryGroup>, OperationError> {
        with_ops!(self, ops => ops.all_products().await)
    }

    pub async fn products_by_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<CatalogProduct>, OperationError> {
        with_ops!(self, ops => ops.products_by_category(category_id).await)
    }

    pub async fn link(
        &self,
        product_id: ProductId,
        category_id: CategoryId,
    ) -> Result<(), OperationError> {
        with_ops!(self, ops => ops.link(product_id, category_id).await)
    }

    pub async fn unlink(
        &self,
        product_id: ProductId,
        category_id: CategoryId,
    ) -> Result<(), OperationError> {
        with_ops!(self, ops => ops.unlink(product_id, category_id).await)
    }

    pub async fn book(
        &self,
        product_id: ProductId,
        requested: i64,
    ) -> Result<BookingReceipt, OperationError> {
        with_ops!(self, ops => ops.book(product_id, requested).await)
    }

    pub async fn restock(
        &self,
        store_id: StoreId,
        quantities: BTreeMap<ProductId, i64>,
    ) -> Result<RestockReport, OperationError> {
        with_ops!(self, ops => ops.restock(store_id, quantities).await)
    }
}

/// Wire the configured backend. Postgres gets its schema applied; the
/// in-memory ledger starts with the demo catalog.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match config.backend {
        Backend::Memory => {
            let ledger = InMemoryLedgerStore::new();
            seed_demo_catalog(&ledger).context("failed to seed demo catalog")?;
            tracing::warn!("using in-memory ledger; data is lost on restart");
            Ok(AppServices::in_memory(ledger))
        }
        Backend::Postgres => {
            let ledger = PgLedgerStore::connect(config)
                .await
                .context("failed to connect to postgres")?;
            ledger.migrate().await.context("failed to apply schema")?;
            Ok(AppServices::postgres(ledger))
        }
    }
}

/// Two stores, two categories, three products. The desk lamp stays
/// uncategorized and unstocked.
pub fn seed_demo_catalog(ledger: &InMemoryLedgerStore) -> Result<(), LedgerError> {
    let north = Store::new(StoreId::new(), "North Warehouse");
    let south = Store::new(StoreId::new(), "South Warehouse");
    let kitchen = Category::new(CategoryId::new(), "Kitchen");
    let lighting = Category::new(CategoryId::new(), "Lighting");
    let kettle = Product::new(ProductId::new(), "Kettle");
    let toaster = Product::new(ProductId::new(), "Toaster");
    let lamp = Product::new(ProductId::new(), "Desk Lamp");

    let links = [
        ProductCategoryLink::new(kettle.id, kitchen.id),
        ProductCategoryLink::new(toaster.id, kitchen.id),
    ];
    let stock = [(kettle.id, north.id, 5), (kettle.id, south.id, 3), (toaster.id, north.id, 2)];

    for (product_id, store_id, quantity) in stock {
        let record =
            AvailabilityRecord::new(AvailabilityId::new(), product_id, store_id, quantity, Utc::now())
                .map_err(|e| LedgerError::InvalidRow(e.to_string()))?;
        ledger.seed_availability(record)?;
    }
    for store in [north, south] {
        ledger.seed_store(store)?;
    }
    for category in [kitchen, lighting] {
        ledger.seed_category(category)?;
    }
    for product in [kettle, toaster, lamp] {
        ledger.seed_product(product)?;
    }
    for link in links {
        ledger.seed_link(link)?;
    }
    Ok(())
}
