//! Postgres-backed ledger.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (serialization failure) | `40001` | `Conflict` | A repeatable-read transaction touched a row changed by a concurrent commit |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Two writers waited on each other |
//! | Database (unique violation) | `23505` | `Conflict` | Concurrent insert of the same link |
//! | Database (other) | Any other | `Backend` | Constraint violations, syntax errors, ... |
//! | PoolTimedOut / PoolClosed | N/A | `Backend` | No connection available |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! ## Thread Safety
//!
//! `PgLedgerStore` is `Send + Sync` and cheap to clone; every transaction owns
//! one pooled connection until it commits or rolls back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockroom_core::{AvailabilityId, CategoryId, ProductId, StoreId};
use stockroom_inventory::{AvailabilityRecord, Store};
use stockroom_products::{Category, Product, ProductCategoryLink};

use super::{IsolationLevel, LedgerError, LedgerStore, LedgerTx};
use crate::config::AppConfig;

const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

/// Rows per multi-row INSERT issued by a flush.
const INSERT_CHUNK: usize = 500;

#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: Arc<PgPool>,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool sized and timed from the process configuration.
    #[instrument(skip(config), fields(max_connections = config.db_max_connections), err)]
    pub async fn connect(config: &AppConfig) -> Result<Self, LedgerError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| LedgerError::Backend("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.db_acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self::new(pool))
    }

    /// Create the schema if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    pub async fn upsert_product(&self, product: &Product) -> Result<(), LedgerError> {
        self.upsert_named("products", *product.id.as_uuid(), &product.name).await
    }

    #[instrument(skip(self, store), fields(store_id = %store.id), err)]
    pub async fn upsert_store(&self, store: &Store) -> Result<(), LedgerError> {
        self.upsert_named("stores", *store.id.as_uuid(), &store.name).await
    }

    #[instrument(skip(self, category), fields(category_id = %category.id), err)]
    pub async fn upsert_category(&self, category: &Category) -> Result<(), LedgerError> {
        self.upsert_named("categories", *category.id.as_uuid(), &category.name).await
    }

    async fn upsert_named(&self, table: &'static str, id: Uuid, name: &str) -> Result<(), LedgerError> {
        let sql = format!(
            "INSERT INTO {table} (id, name) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name"
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(name)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    #[instrument(skip(self), err)]
    async fn begin(&self, isolation: IsolationLevel) -> Result<PgLedgerTx, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(isolation.as_sql())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(PgLedgerTx {
            tx,
            pending: Vec::new(),
        })
    }
}

/// Open Postgres transaction. New availability rows are buffered in
/// `pending` and written in bulk by [`LedgerTx::flush`].
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
    pending: Vec<AvailabilityRecord>,
}

impl std::fmt::Debug for PgLedgerTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgLedgerTx")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl PgLedgerTx {
    async fn write_pending(&mut self) -> Result<(), LedgerError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        for chunk in pending.chunks(INSERT_CHUNK) {
            let mut insert: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO product_availability (id, product_id, store_id, quantity, restocked_at) ",
            );
            insert.push_values(chunk, |mut row, record| {
                row.push_bind(*record.id.as_uuid())
                    .push_bind(*record.product_id.as_uuid())
                    .push_bind(*record.store_id.as_uuid())
                    .push_bind(record.quantity())
                    .push_bind(record.restocked_at);
            });
            insert
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("insert_availability", e))?;
        }
        Ok(())
    }

    async fn fetch_availability(
        &mut self,
        product_id: Option<ProductId>,
    ) -> Result<Vec<AvailabilityRecord>, LedgerError> {
        // Own inserts must be visible to reads in the same transaction.
        self.write_pending().await?;

        let rows = match product_id {
            Some(product_id) => {
                sqlx::query(
                    r#"
                    SELECT id, product_id, store_id, quantity, restocked_at
                    FROM product_availability
                    WHERE product_id = $1
                    ORDER BY store_id ASC, id ASC
                    "#,
                )
                .bind(product_id.as_uuid())
                .fetch_all(&mut *self.tx)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, product_id, store_id, quantity, restocked_at
                    FROM product_availability
                    ORDER BY product_id ASC, store_id ASC, id ASC
                    "#,
                )
                .fetch_all(&mut *self.tx)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("load_availability", e))?;

        rows.iter()
            .map(|row| {
                let row = AvailabilityRow::from_row(row)
                    .map_err(|e| LedgerError::InvalidRow(format!("availability row: {e}")))?;
                AvailabilityRecord::try_from(row)
            })
            .collect()
    }

    async fn fetch_named(
        &mut self,
        operation: &'static str,
        sql: &'static str,
        id: Option<Uuid>,
    ) -> Result<Vec<NamedRow>, LedgerError> {
        let mut query = sqlx::query(sql);
        if let Some(id) = id {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(|row| {
                NamedRow::from_row(row)
                    .map_err(|e| LedgerError::InvalidRow(format!("{operation} row: {e}")))
            })
            .collect()
    }

    async fn fetch_links(
        &mut self,
        category_id: Option<CategoryId>,
    ) -> Result<Vec<ProductCategoryLink>, LedgerError> {
        let rows = match category_id {
            Some(category_id) => {
                sqlx::query(
                    r#"
                    SELECT product_id, category_id
                    FROM product_categories
                    WHERE category_id = $1
                    ORDER BY product_id ASC
                    "#,
                )
                .bind(category_id.as_uuid())
                .fetch_all(&mut *self.tx)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT product_id, category_id
                    FROM product_categories
                    ORDER BY product_id ASC, category_id ASC
                    "#,
                )
                .fetch_all(&mut *self.tx)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("load_links", e))?;

        rows.iter()
            .map(|row| {
                LinkRow::from_row(row)
                    .map(Into::into)
                    .map_err(|e| LedgerError::InvalidRow(format!("link row: {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, LedgerError> {
        let rows = self
            .fetch_named(
                "load_product",
                "SELECT id, name FROM products WHERE id = $1",
                Some(*id.as_uuid()),
            )
            .await?;
        Ok(rows.into_iter().next().map(Into::into))
    }

    async fn products(&mut self) -> Result<Vec<Product>, LedgerError> {
        let rows = self
            .fetch_named("load_products", "SELECT id, name FROM products ORDER BY id ASC", None)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, ids), fields(requested = ids.len()), err)]
    async fn products_by_ids(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, LedgerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query("SELECT id, name FROM products WHERE id = ANY($1) ORDER BY id ASC")
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_products_by_ids", e))?;

        rows.iter()
            .map(|row| {
                NamedRow::from_row(row)
                    .map(Into::into)
                    .map_err(|e| LedgerError::InvalidRow(format!("product row: {e}")))
            })
            .collect()
    }

    async fn store(&mut self, id: StoreId) -> Result<Option<Store>, LedgerError> {
        let rows = self
            .fetch_named(
                "load_store",
                "SELECT id, name FROM stores WHERE id = $1",
                Some(*id.as_uuid()),
            )
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| Store::new(StoreId::from_uuid(row.id), row.name)))
    }

    async fn category(&mut self, id: CategoryId) -> Result<Option<Category>, LedgerError> {
        let rows = self
            .fetch_named(
                "load_category",
                "SELECT id, name FROM categories WHERE id = $1",
                Some(*id.as_uuid()),
            )
            .await?;
        Ok(rows.into_iter().next().map(Into::into))
    }

    async fn categories(&mut self) -> Result<Vec<Category>, LedgerError> {
        let rows = self
            .fetch_named(
                "load_categories",
                "SELECT id, name FROM categories ORDER BY id ASC",
                None,
            )
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn link(
        &mut self,
        product_id: ProductId,
        category_id: CategoryId,
    ) -> Result<Option<ProductCategoryLink>, LedgerError> {
        let row = sqlx::query(
            "SELECT product_id, category_id FROM product_categories \
             WHERE product_id = $1 AND category_id = $2",
        )
        .bind(product_id.as_uuid())
        .bind(category_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_link", e))?;

        row.map(|row| {
            LinkRow::from_row(&row)
                .map(Into::into)
                .map_err(|e| LedgerError::InvalidRow(format!("link row: {e}")))
        })
        .transpose()
    }

    async fn links(&mut self) -> Result<Vec<ProductCategoryLink>, LedgerError> {
        self.fetch_links(None).await
    }

    async fn links_in_category(
        &mut self,
        category_id: CategoryId,
    ) -> Result<Vec<ProductCategoryLink>, LedgerError> {
        self.fetch_links(Some(category_id)).await
    }

    async fn insert_link(&mut self, link: ProductCategoryLink) -> Result<(), LedgerError> {
        sqlx::query("INSERT INTO product_categories (product_id, category_id) VALUES ($1, $2)")
            .bind(link.product_id.as_uuid())
            .bind(link.category_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_link", e))?;
        Ok(())
    }

    async fn delete_link(&mut self, link: ProductCategoryLink) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "DELETE FROM product_categories WHERE product_id = $1 AND category_id = $2",
        )
        .bind(link.product_id.as_uuid())
        .bind(link.category_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("delete_link", e))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Conflict(format!(
                "product {} is no longer linked to category {}",
                link.product_id, link.category_id
            )));
        }
        Ok(())
    }

    async fn availability(&mut self) -> Result<Vec<AvailabilityRecord>, LedgerError> {
        self.fetch_availability(None).await
    }

    async fn availability_of(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<AvailabilityRecord>, LedgerError> {
        self.fetch_availability(Some(product_id)).await
    }

    async fn insert_availability(&mut self, record: AvailabilityRecord) -> Result<(), LedgerError> {
        self.pending.push(record);
        Ok(())
    }

    async fn update_availability(&mut self, record: &AvailabilityRecord) -> Result<(), LedgerError> {
        let result = sqlx::query("UPDATE product_availability SET quantity = $1 WHERE id = $2")
            .bind(record.quantity())
            .bind(record.id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_availability", e))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Conflict(format!(
                "availability {} no longer exists",
                record.id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(pending = self.pending.len()), err)]
    async fn flush(&mut self) -> Result<(), LedgerError> {
        self.write_pending().await
    }

    #[instrument(skip(self), err)]
    async fn commit(mut self) -> Result<(), LedgerError> {
        self.write_pending().await?;
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to LedgerError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some(code) if is_conflict_code(code) => LedgerError::Conflict(msg),
                _ => LedgerError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            LedgerError::Backend(format!("timed out acquiring a connection in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            LedgerError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => LedgerError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Serialization failure, deadlock, unique violation.
fn is_conflict_code(code: &str) -> bool {
    matches!(code, "40001" | "40P01" | "23505")
}

// SQLx row types

#[derive(Debug)]
struct NamedRow {
    id: Uuid,
    name: String,
}

impl<'r> FromRow<'r, PgRow> for NamedRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(NamedRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    }
}

impl From<NamedRow> for Product {
    fn from(row: NamedRow) -> Self {
        Product::new(ProductId::from_uuid(row.id), row.name)
    }
}

impl From<NamedRow> for Category {
    fn from(row: NamedRow) -> Self {
        Category::new(CategoryId::from_uuid(row.id), row.name)
    }
}

#[derive(Debug)]
struct LinkRow {
    product_id: Uuid,
    category_id: Uuid,
}

impl<'r> FromRow<'r, PgRow> for LinkRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LinkRow {
            product_id: row.try_get("product_id")?,
            category_id: row.try_get("category_id")?,
        })
    }
}

impl From<LinkRow> for ProductCategoryLink {
    fn from(row: LinkRow) -> Self {
        ProductCategoryLink::new(
            ProductId::from_uuid(row.product_id),
            CategoryId::from_uuid(row.category_id),
        )
    }
}

#[derive(Debug)]
struct AvailabilityRow {
    id: Uuid,
    product_id: Uuid,
    store_id: Uuid,
    quantity: i64,
    restocked_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AvailabilityRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AvailabilityRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            store_id: row.try_get("store_id")?,
            quantity: row.try_get("quantity")?,
            restocked_at: row.try_get("restocked_at")?,
        })
    }
}

impl TryFrom<AvailabilityRow> for AvailabilityRecord {
    type Error = LedgerError;

    fn try_from(row: AvailabilityRow) -> Result<Self, Self::Error> {
        AvailabilityRecord::new(
            AvailabilityId::from_uuid(row.id),
            ProductId::from_uuid(row.product_id),
            StoreId::from_uuid(row.store_id),
            row.quantity,
            row.restocked_at,
        )
        .map_err(|e| LedgerError::InvalidRow(format!("availability {}: {e}", row.id)))
    }
}
