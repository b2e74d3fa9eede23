use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{AvailabilityId, DomainError, Entity, ProductId, StoreId};

/// Quantity of one product held at one store.
///
/// Several records may exist for the same (product, store) pair: restocking
/// appends, it never merges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityRecord {
    pub id: AvailabilityId,
    pub product_id: ProductId,
    pub store_id: StoreId,
    quantity: i64,
    pub restocked_at: DateTime<Utc>,
}

impl AvailabilityRecord {
    /// Build a record, refusing negative quantities.
    pub fn new(
        id: AvailabilityId,
        product_id: ProductId,
        store_id: StoreId,
        quantity: i64,
        restocked_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if quantity < 0 {
            return Err(DomainError::invariant(format!(
                "availability {id} cannot hold negative quantity {quantity}"
            )));
        }
        Ok(Self {
            id,
            product_id,
            store_id,
            quantity,
            restocked_at,
        })
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Remove `amount` units from this record.
    pub fn decrement(&mut self, amount: i64) -> Result<(), DomainError> {
        if amount < 0 || amount > self.quantity {
            return Err(DomainError::invariant(format!(
                "cannot take {amount} from availability {} holding {}",
                self.id, self.quantity
            )));
        }
        self.quantity -= amount;
        Ok(())
    }

    pub fn stock_level(&self) -> StockLevel {
        StockLevel {
            store_id: self.store_id,
            quantity: self.quantity,
        }
    }
}

impl Entity for AvailabilityRecord {
    type Id = AvailabilityId;

    fn id(&self) -> AvailabilityId {
        self.id
    }
}

/// Per-store availability entry as exposed by the catalog view.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub store_id: StoreId,
    pub quantity: i64,
}

/// Sum of quantities across records, saturating at `i64::MAX`.
///
/// Restocks append without bound, so the true total can exceed `i64`. Any
/// valid booking request is at most `i64::MAX`, so the saturated value still
/// answers the sufficiency check correctly.
pub fn total_quantity<'a>(records: impl IntoIterator<Item = &'a AvailabilityRecord>) -> i64 {
    records
        .into_iter()
        .fold(0i64, |total, r| total.saturating_add(r.quantity))
}

/// Ordering used wherever records are consumed or listed: store id, then record id.
pub fn allocation_order(a: &AvailabilityRecord, b: &AvailabilityRecord) -> core::cmp::Ordering {
    a.store_id.cmp(&b.store_id).then(a.id.cmp(&b.id))
}
