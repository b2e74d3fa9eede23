use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use stockroom_core::{ProductId, StoreId};
use stockroom_inventory::{is_checkpoint, plan_restock};

use super::{OperationError, RestockReport, StockOperations, settle};
use crate::ledger::{IsolationLevel, LedgerStore, LedgerTx};

impl<S: LedgerStore> StockOperations<S> {
    /// Append one availability record per requested product to a store.
    ///
    /// The transaction is flushed after inserts 0, 20, 40, ... and once more
    /// before the single commit. Nothing becomes visible unless every insert
    /// made it.
    #[instrument(skip(self, quantities), fields(store_id = %store_id, requested = quantities.len()), err)]
    pub async fn restock(
        &self,
        store_id: StoreId,
        quantities: BTreeMap<ProductId, i64>,
    ) -> Result<RestockReport, OperationError> {
        let mut tx = self.store.begin(IsolationLevel::RepeatableRead).await?;
        let outcome = restock_in(&mut tx, store_id, &quantities).await;
        let report = settle(tx, outcome).await.inspect_err(|err| {
            if let OperationError::Rejected(rejections) = err {
                warn!(%rejections, "restock rejected");
            }
        })?;

        info!(
            inserted = report.inserted,
            checkpoints = report.checkpoints,
            "restock committed"
        );
        Ok(report)
    }
}

async fn restock_in<Tx: LedgerTx>(
    tx: &mut Tx,
    store_id: StoreId,
    quantities: &BTreeMap<ProductId, i64>,
) -> Result<RestockReport, OperationError> {
    let store = tx.store(store_id).await?;
    let ids: Vec<ProductId> = quantities.keys().copied().collect();
    let known: HashSet<ProductId> = tx
        .products_by_ids(&ids)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let plan = plan_restock(store_id, store.as_ref(), &known, quantities, Utc::now())?;
    let dropped = quantities.len() - plan.records.len();
    if dropped > 0 {
        debug!(dropped, "ignoring unknown products");
    }

    let inserted = plan.records.len();
    let mut checkpoints = 0;
    for (index, record) in plan.records.into_iter().enumerate() {
        tx.insert_availability(record).await?;
        if is_checkpoint(index) {
            tx.flush().await?;
            checkpoints += 1;
            debug!(index, "checkpoint");
        }
    }
    tx.flush().await?;

    Ok(RestockReport {
        store_id,
        inserted,
        checkpoints,
    })
}
