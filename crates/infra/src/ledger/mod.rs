//! Transactional record storage boundary.
//!
//! The stock operations only ever talk to a [`LedgerStore`]: they open a
//! transaction at an explicit isolation level, read what they need to
//! validate, write, and commit. Two backends implement it:
//!
//! - [`InMemoryLedgerStore`]: tests/dev, with first-committer-wins conflict
//!   detection for repeatable-read transactions.
//! - [`PgLedgerStore`]: Postgres via SQLx.
//!
//! ## Checkpoints
//!
//! [`LedgerTx::flush`] pushes buffered writes down to the backend and drops
//! the transaction's in-memory tracking of already-written rows, but leaves
//! the transaction open. It is not a commit: a later rollback still discards
//! everything.

use async_trait::async_trait;
use thiserror::Error;

use stockroom_core::{CategoryId, ProductId, StoreId};
use stockroom_inventory::{AvailabilityRecord, Store};
use stockroom_products::{Category, Product, ProductCategoryLink};

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryLedgerStore, LedgerStats};
pub use postgres::PgLedgerStore;

/// Isolation level requested when a transaction begins.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Each read sees the latest committed state; concurrent writers are not blocked.
    ReadCommitted,
    /// Rows read by the transaction may not change underneath it. A concurrent
    /// commit touching them makes this transaction fail with a conflict.
    RepeatableRead,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
        }
    }
}

/// Ledger storage error.
///
/// These are **infrastructure errors**; caller-correctable failures are
/// domain rejections and never show up here.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Isolation guarantees were violated by a concurrent writer. Retryable.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("ledger backend failure: {0}")]
    Backend(String),

    /// A stored row could not be turned back into a domain value.
    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

/// Entry point of a ledger backend.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, LedgerError>;
}

/// One open transaction.
///
/// Dropping a transaction without calling [`LedgerTx::commit`] discards its
/// writes.
#[async_trait]
pub trait LedgerTx: Send {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, LedgerError>;

    /// All products, ascending by id.
    async fn products(&mut self) -> Result<Vec<Product>, LedgerError>;

    /// The subset of `ids` that exist, ascending by id.
    async fn products_by_ids(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, LedgerError>;

    async fn store(&mut self, id: StoreId) -> Result<Option<Store>, LedgerError>;

    async fn category(&mut self, id: CategoryId) -> Result<Option<Category>, LedgerError>;

    /// All categories, ascending by id.
    async fn categories(&mut self) -> Result<Vec<Category>, LedgerError>;

    async fn link(
        &mut self,
        product_id: ProductId,
        category_id: CategoryId,
    ) -> Result<Option<ProductCategoryLink>, LedgerError>;

    async fn links(&mut self) -> Result<Vec<ProductCategoryLink>, LedgerError>;

    async fn links_in_category(
        &mut self,
        category_id: CategoryId,
    ) -> Result<Vec<ProductCategoryLink>, LedgerError>;

    async fn insert_link(&mut self, link: ProductCategoryLink) -> Result<(), LedgerError>;

    async fn delete_link(&mut self, link: ProductCategoryLink) -> Result<(), LedgerError>;

    /// Every availability record.
    async fn availability(&mut self) -> Result<Vec<AvailabilityRecord>, LedgerError>;

    /// Availability records of one product.
    async fn availability_of(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<AvailabilityRecord>, LedgerError>;

    /// Buffer a new record. It is written at the next [`LedgerTx::flush`] or at commit.
    async fn insert_availability(&mut self, record: AvailabilityRecord) -> Result<(), LedgerError>;

    async fn update_availability(&mut self, record: &AvailabilityRecord) -> Result<(), LedgerError>;

    /// Checkpoint: write pending changes, clear tracked rows, keep the transaction open.
    async fn flush(&mut self) -> Result<(), LedgerError>;

    async fn commit(self) -> Result<(), LedgerError>;

    async fn rollback(self) -> Result<(), LedgerError>;
}
