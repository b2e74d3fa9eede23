//! Transactional stock operations.
//!
//! Each operation opens one ledger transaction, reads what it needs, runs the
//! pure domain checks from `stockroom-inventory` / `stockroom-products`, and
//! only then writes. A rejected or failed operation rolls its transaction back.

use thiserror::Error;
use tracing::warn;

use stockroom_core::{DomainError, ProductId, Rejections, StoreId};
use stockroom_inventory::Decrement;

use crate::ledger::{LedgerError, LedgerStore, LedgerTx};

mod booking;
mod catalog;
mod links;
mod restock;

/// Failure of a stock operation.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Caller-correctable; every failing check is listed.
    #[error("{0}")]
    Rejected(Rejections),

    /// A concurrent transaction won. Safe to retry.
    #[error("concurrent update: {0}")]
    Conflict(String),

    #[error(transparent)]
    Ledger(LedgerError),

    /// Stored data broke a domain invariant.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl OperationError {
    pub fn rejections(&self) -> Option<&Rejections> {
        match self {
            OperationError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<LedgerError> for OperationError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Conflict(msg) => OperationError::Conflict(msg),
            other => OperationError::Ledger(other),
        }
    }
}

impl From<Rejections> for OperationError {
    fn from(value: Rejections) -> Self {
        OperationError::Rejected(value)
    }
}

impl From<DomainError> for OperationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Rejected(r) => OperationError::Rejected(r),
            DomainError::InvariantViolation(msg) | DomainError::InvalidId(msg) => {
                OperationError::Invariant(msg)
            }
        }
    }
}

/// Result of a successful booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingReceipt {
    pub product_id: ProductId,
    pub booked: i64,
    /// Total units of the product left across all stores.
    pub remaining: i64,
    pub decrements: Vec<Decrement>,
}

/// Result of a successful restock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RestockReport {
    pub store_id: StoreId,
    pub inserted: usize,
    /// Scheduled mid-ingest flushes; the final flush before commit is not counted.
    pub checkpoints: usize,
}

/// Stock operations over one ledger backend.
#[derive(Debug, Clone)]
pub struct StockOperations<S> {
    store: S,
}

impl<S: LedgerStore> StockOperations<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Commit on success, roll back on failure.
async fn settle<Tx, T>(tx: Tx, outcome: Result<T, OperationError>) -> Result<T, OperationError>
where
    Tx: LedgerTx,
{
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
