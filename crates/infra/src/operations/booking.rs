use tracing::{info, instrument, warn};

use stockroom_core::ProductId;
use stockroom_inventory::{allocate, check_requested};

use super::{BookingReceipt, OperationError, StockOperations, settle};
use crate::ledger::{IsolationLevel, LedgerStore, LedgerTx};

impl<S: LedgerStore> StockOperations<S> {
    /// Take `requested` units of a product out of its availability records.
    ///
    /// Records are drained in ascending (store id, record id) order. Either the
    /// whole quantity is booked or nothing changes.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn book(
        &self,
        product_id: ProductId,
        requested: i64,
    ) -> Result<BookingReceipt, OperationError> {
        if let Err(rejections) = check_requested(requested) {
            warn!(%rejections, "booking rejected");
            return Err(rejections.into());
        }

        let mut tx = self.store.begin(IsolationLevel::RepeatableRead).await?;
        let outcome = book_in(&mut tx, product_id, requested).await;
        let receipt = settle(tx, outcome).await.inspect_err(|err| {
            if !matches!(err, OperationError::Ledger(_) | OperationError::Invariant(_)) {
                warn!(error = %err, "booking not applied");
            }
        })?;

        info!(
            booked = receipt.booked,
            remaining = receipt.remaining,
            records_touched = receipt.decrements.len(),
            "booking committed"
        );
        Ok(receipt)
    }
}

async fn book_in<Tx: LedgerTx>(
    tx: &mut Tx,
    product_id: ProductId,
    requested: i64,
) -> Result<BookingReceipt, OperationError> {
    let records = tx.availability_of(product_id).await?;
    let allocation = allocate(product_id, records, requested)?;

    for record in &allocation.updated {
        tx.update_availability(record).await?;
    }

    Ok(BookingReceipt {
        product_id,
        booked: allocation.requested,
        remaining: allocation.available_after(),
        decrements: allocation.decrements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_core::{AvailabilityId, Rejection, StoreId};
    use std::collections::BTreeMap;
    use stockroom_inventory::{AvailabilityRecord, Store};
    use stockroom_products::Product;
    use uuid::Uuid;

    use crate::ledger::InMemoryLedgerStore;

    fn store_id(n: u128) -> StoreId {
        StoreId::from_uuid(Uuid::from_u128(n))
    }

    fn seed(ledger: &InMemoryLedgerStore, product_id: ProductId, store_id: StoreId, qty: i64) {
        ledger
            .seed_availability(
                AvailabilityRecord::new(AvailabilityId::new(), product_id, store_id, qty, Utc::now())
                    .unwrap(),
            )
            .unwrap();
    }

    fn quantities(ledger: &InMemoryLedgerStore, product_id: ProductId) -> Vec<(StoreId, i64)> {
        ledger
            .committed_availability(product_id)
            .unwrap()
            .iter()
            .map(|r| (r.store_id, r.quantity()))
            .collect()
    }

    fn rejection(err: OperationError) -> Vec<Rejection> {
        match err {
            OperationError::Rejected(r) => r.into_vec(),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn drains_stores_in_order_until_exhausted() {
        let ledger = InMemoryLedgerStore::new();
        let product_id = ProductId::new();
        let (a, b) = (store_id(1), store_id(2));
        seed(&ledger, product_id, b, 3);
        seed(&ledger, product_id, a, 5);
        let ops = StockOperations::new(ledger.clone());

        let receipt = ops.book(product_id, 7).await.unwrap();
        assert_eq!(receipt.remaining, 1);
        assert_eq!(quantities(&ledger, product_id), vec![(a, 0), (b, 1)]);

        ops.book(product_id, 1).await.unwrap();
        assert_eq!(quantities(&ledger, product_id), vec![(a, 0), (b, 0)]);

        let err = ops.book(product_id, 1).await.unwrap_err();
        assert_eq!(
            rejection(err),
            vec![Rejection::InsufficientStock {
                available: 0,
                requested: 1
            }]
        );
    }

    #[tokio::test]
    async fn oversized_booking_changes_nothing() {
        let ledger = InMemoryLedgerStore::new();
        let product_id = ProductId::new();
        seed(&ledger, product_id, store_id(1), 2);
        seed(&ledger, product_id, store_id(2), 2);
        let ops = StockOperations::new(ledger.clone());

        let err = ops.book(product_id, 5).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "there are 4 units available but 5 were requested"
        );
        assert_eq!(
            quantities(&ledger, product_id),
            vec![(store_id(1), 2), (store_id(2), 2)]
        );
        assert_eq!(ledger.stats().commits, 0);
        assert_eq!(ledger.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected_without_a_transaction() {
        let ledger = InMemoryLedgerStore::new();
        let product_id = ProductId::new();
        seed(&ledger, product_id, store_id(1), 2);
        let ops = StockOperations::new(ledger.clone());

        for requested in [0, -3] {
            let err = ops.book(product_id, requested).await.unwrap_err();
            assert_eq!(rejection(err), vec![Rejection::InvalidQuantity { requested }]);
        }
        assert_eq!(ledger.stats().rollbacks, 0);
        assert_eq!(quantities(&ledger, product_id), vec![(store_id(1), 2)]);
    }

    #[tokio::test]
    async fn unstocked_product_is_out_of_stock() {
        let ops = StockOperations::new(InMemoryLedgerStore::new());
        let err = ops.book(ProductId::new(), 1).await.unwrap_err();
        assert_eq!(rejection(err), vec![Rejection::OutOfStock]);
    }

    #[tokio::test]
    async fn exact_total_empties_every_record() {
        let ledger = InMemoryLedgerStore::new();
        let product_id = ProductId::new();
        seed(&ledger, product_id, store_id(1), 4);
        seed(&ledger, product_id, store_id(2), 6);
        let ops = StockOperations::new(ledger.clone());

        let receipt = ops.book(product_id, 10).await.unwrap();
        assert_eq!(receipt.remaining, 0);
        assert_eq!(receipt.decrements.len(), 2);
        assert!(quantities(&ledger, product_id).iter().all(|(_, q)| *q == 0));
    }

    #[tokio::test]
    async fn concurrent_bookings_of_the_same_rows_conflict() {
        let ledger = InMemoryLedgerStore::new();
        let product_id = ProductId::new();
        seed(&ledger, product_id, store_id(1), 10);

        // Interleave two bookings by hand: both read before either commits.
        let mut first = ledger.begin(IsolationLevel::RepeatableRead).await.unwrap();
        let mut second = ledger.begin(IsolationLevel::RepeatableRead).await.unwrap();
        let a = book_in(&mut first, product_id, 4).await.unwrap();
        let b = book_in(&mut second, product_id, 4).await.unwrap();
        assert_eq!((a.remaining, b.remaining), (6, 6));

        settle(first, Ok(a)).await.unwrap();
        let err = settle(second, Ok(b)).await.unwrap_err();
        assert!(matches!(err, OperationError::Conflict(_)));

        assert_eq!(quantities(&ledger, product_id), vec![(store_id(1), 6)]);
    }

    #[tokio::test]
    async fn stock_beyond_i64_range_is_still_bookable() {
        let ledger = InMemoryLedgerStore::new();
        let product = Product::new(ProductId::new(), "Bolt");
        let product_id = product.id;
        ledger.seed_product(product).unwrap();
        ledger.seed_store(Store::new(store_id(1), "Dock")).unwrap();
        let ops = StockOperations::new(ledger.clone());

        for qty in [i64::MAX, 1] {
            ops.restock(store_id(1), BTreeMap::from([(product_id, qty)]))
                .await
                .unwrap();
        }

        let receipt = ops.book(product_id, 1).await.unwrap();
        assert_eq!(receipt.booked, 1);
        assert_eq!(receipt.decrements.len(), 1);
        let mut left: Vec<i64> = quantities(&ledger, product_id).iter().map(|(_, q)| *q).collect();
        left.sort_unstable();
        assert!(left == vec![0, i64::MAX] || left == vec![1, i64::MAX - 1]);
    }
}
