//! Restock validation and the checkpoint schedule used while ingesting.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use stockroom_core::{AvailabilityId, DomainError, ProductId, Rejection, Rejections, StoreId};

use crate::availability::AvailabilityRecord;
use crate::store::Store;

/// Inserts between two forced write-buffer flushes.
pub const CHECKPOINT_INTERVAL: usize = 20;

/// Whether the insert at `index` (0-based) is followed by a checkpoint.
///
/// Fires at 0, 20, 40, ...
pub fn is_checkpoint(index: usize) -> bool {
    index % CHECKPOINT_INTERVAL == 0
}

/// Records to append for one validated restock request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestockPlan {
    pub store_id: StoreId,
    pub records: Vec<AvailabilityRecord>,
}

/// Validate a restock request against what the ledger returned and build the
/// records to insert.
///
/// Every failing check is reported. Requested products missing from `known`
/// are dropped from the plan; only an empty `known` set is an error.
pub fn plan_restock(
    store_id: StoreId,
    store: Option<&Store>,
    known: &HashSet<ProductId>,
    requested: &BTreeMap<ProductId, i64>,
    restocked_at: DateTime<Utc>,
) -> Result<RestockPlan, DomainError> {
    let mut rejections = Vec::new();

    if store.is_none() {
        rejections.push(Rejection::StoreNotFound);
    }
    if known.is_empty() {
        rejections.push(Rejection::ProductsNotFound);
    }

    let negative: Vec<(ProductId, i64)> = requested
        .iter()
        .filter(|(_, qty)| **qty < 0)
        .map(|(id, qty)| (*id, *qty))
        .collect();
    if !negative.is_empty() {
        rejections.push(Rejection::NegativeQuantity(negative));
    }

    Rejections::check(rejections)?;

    let records = requested
        .iter()
        .filter(|(id, _)| known.contains(*id))
        .map(|(product_id, qty)| {
            AvailabilityRecord::new(AvailabilityId::new(), *product_id, store_id, *qty, restocked_at)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RestockPlan { store_id, records })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejections(err: DomainError) -> Vec<Rejection> {
        match err {
            DomainError::Rejected(r) => r.into_vec(),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn checkpoint_schedule_starts_at_zero() {
        let fired: Vec<usize> = (0..45).filter(|i| is_checkpoint(*i)).collect();
        assert_eq!(fired, vec![0, 20, 40]);
    }

    #[test]
    fn builds_one_record_per_known_product() {
        let store = Store::new(StoreId::new(), "North");
        let known_id = ProductId::new();
        let unknown_id = ProductId::new();
        let known: HashSet<_> = [known_id].into_iter().collect();
        let requested: BTreeMap<_, _> = [(known_id, 4), (unknown_id, 9)].into_iter().collect();

        let plan = plan_restock(store.id, Some(&store), &known, &requested, Utc::now()).unwrap();

        assert_eq!(plan.records.len(), 1);
        assert_eq!(plan.records[0].product_id, known_id);
        assert_eq!(plan.records[0].store_id, store.id);
        assert_eq!(plan.records[0].quantity(), 4);
    }

    #[test]
    fn zero_quantity_is_accepted() {
        let store = Store::new(StoreId::new(), "North");
        let p = ProductId::new();
        let known: HashSet<_> = [p].into_iter().collect();
        let requested: BTreeMap<_, _> = [(p, 0)].into_iter().collect();

        let plan = plan_restock(store.id, Some(&store), &known, &requested, Utc::now()).unwrap();
        assert_eq!(plan.records[0].quantity(), 0);
    }

    #[test]
    fn reports_every_failure_at_once() {
        let a = ProductId::new();
        let b = ProductId::new();
        let requested: BTreeMap<_, _> = [(a, -1), (b, -2)].into_iter().collect();

        let err = plan_restock(StoreId::new(), None, &HashSet::new(), &requested, Utc::now())
            .unwrap_err();

        let mut offenders = vec![(a, -1), (b, -2)];
        offenders.sort();
        assert_eq!(
            rejections(err),
            vec![
                Rejection::StoreNotFound,
                Rejection::ProductsNotFound,
                Rejection::NegativeQuantity(offenders),
            ]
        );
    }

    #[test]
    fn one_negative_quantity_rejects_the_whole_batch() {
        let store = Store::new(StoreId::new(), "North");
        let good = ProductId::new();
        let bad = ProductId::new();
        let known: HashSet<_> = [good, bad].into_iter().collect();
        let requested: BTreeMap<_, _> = [(good, 10), (bad, -5)].into_iter().collect();

        let err = plan_restock(store.id, Some(&store), &known, &requested, Utc::now()).unwrap_err();
        assert_eq!(rejections(err), vec![Rejection::NegativeQuantity(vec![(bad, -5)])]);
    }
}
