//! Booking allocation: spread one requested quantity across availability records.

use stockroom_core::{AvailabilityId, DomainError, ProductId, Rejection, Rejections, StoreId};

use crate::availability::{AvailabilityRecord, allocation_order, total_quantity};

/// Units taken from one record by a booking.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Decrement {
    pub availability_id: AvailabilityId,
    pub store_id: StoreId,
    pub taken: i64,
    pub remaining: i64,
}

/// Outcome of a successful allocation.
///
/// `updated` holds only the records whose quantity changed, already carrying
/// their new quantity; they are what must be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub product_id: ProductId,
    pub requested: i64,
    pub available_before: i64,
    pub updated: Vec<AvailabilityRecord>,
    pub decrements: Vec<Decrement>,
}

impl Allocation {
    pub fn available_after(&self) -> i64 {
        self.available_before - self.requested
    }
}

/// Validate a booking request before any record has been read.
pub fn check_requested(requested: i64) -> Result<(), Rejections> {
    if requested < 1 {
        return Err(Rejection::InvalidQuantity { requested }.into());
    }
    Ok(())
}

/// Greedy first-fit allocation of `requested` units over `records`.
///
/// Records are consumed in ascending (store id, record id) order. Sufficiency
/// is checked before anything is touched, so a rejection leaves every record
/// exactly as it was handed in.
pub fn allocate(
    product_id: ProductId,
    mut records: Vec<AvailabilityRecord>,
    requested: i64,
) -> Result<Allocation, DomainError> {
    check_requested(requested)?;

    if records.is_empty() {
        return Err(Rejections::single(Rejection::OutOfStock).into());
    }

    let available_before = total_quantity(&records);
    if available_before < requested {
        return Err(Rejections::single(Rejection::InsufficientStock {
            available: available_before,
            requested,
        })
        .into());
    }

    records.sort_by(allocation_order);

    let mut outstanding = requested;
    let mut updated = Vec::new();
    let mut decrements = Vec::new();

    for mut record in records {
        if outstanding == 0 {
            break;
        }
        if record.quantity() == 0 {
            continue;
        }

        let taken = outstanding.min(record.quantity());
        record.decrement(taken)?;
        outstanding -= taken;

        decrements.push(Decrement {
            availability_id: record.id,
            store_id: record.store_id,
            taken,
            remaining: record.quantity(),
        });
        updated.push(record);
    }

    if outstanding != 0 {
        return Err(DomainError::invariant(format!(
            "allocation left {outstanding} units unassigned"
        )));
    }

    Ok(Allocation {
        product_id,
        requested,
        available_before,
        updated,
        decrements,
    })
}
