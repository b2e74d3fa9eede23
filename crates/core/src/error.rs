//! Domain error model.

use thiserror::Error;

use crate::id::ProductId;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Storage and
/// concurrency faults belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A request was rejected; carries every reason that applied.
    #[error("{0}")]
    Rejected(Rejections),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

impl From<Rejections> for DomainError {
    fn from(value: Rejections) -> Self {
        Self::Rejected(value)
    }
}

/// A single caller-correctable reason an operation was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("product does not exist")]
    ProductNotFound,

    #[error("category does not exist")]
    CategoryNotFound,

    #[error("product is already in the category")]
    AlreadyLinked,

    #[error("product is not in the category")]
    NotLinked,

    #[error("booking quantity must be 1 or more, got {requested}")]
    InvalidQuantity { requested: i64 },

    #[error("product is not stocked in any store")]
    OutOfStock,

    #[error("there are {available} units available but {requested} were requested")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("store not found")]
    StoreNotFound,

    #[error("products not found")]
    ProductsNotFound,

    #[error("negative quantities are not allowed: {}", format_offenders(.0))]
    NegativeQuantity(Vec<(ProductId, i64)>),
}

fn format_offenders(offenders: &[(ProductId, i64)]) -> String {
    offenders
        .iter()
        .map(|(id, qty)| format!("{id}={qty}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every rejection collected while validating one request.
///
/// Never empty. Displays as the individual messages joined with `"; "`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejections(Vec<Rejection>);

impl Rejections {
    /// Turn a validation pass into a result: `Ok(())` when nothing was collected.
    pub fn check(collected: Vec<Rejection>) -> Result<(), Rejections> {
        if collected.is_empty() {
            Ok(())
        } else {
            Err(Self(collected))
        }
    }

    pub fn single(rejection: Rejection) -> Self {
        Self(vec![rejection])
    }

    pub fn as_slice(&self) -> &[Rejection] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Rejection> {
        self.0
    }
}

impl From<Rejection> for Rejections {
    fn from(value: Rejection) -> Self {
        Self::single(value)
    }
}

impl core::fmt::Display for Rejections {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (idx, rejection) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            core::fmt::Display::fmt(rejection, f)?;
        }
        Ok(())
    }
}

impl std::error::Error for Rejections {}
