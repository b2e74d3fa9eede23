use tracing::{info, instrument, warn};

use stockroom_core::{CategoryId, ProductId};
use stockroom_products::{ProductCategoryLink, check_link, check_unlink};

use super::{OperationError, StockOperations, settle};
use crate::ledger::{IsolationLevel, LedgerStore, LedgerTx};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum LinkChange {
    Link,
    Unlink,
}

impl<S: LedgerStore> StockOperations<S> {
    /// Put a product in a category.
    #[instrument(skip(self), fields(product_id = %product_id, category_id = %category_id), err)]
    pub async fn link(
        &self,
        product_id: ProductId,
        category_id: CategoryId,
    ) -> Result<(), OperationError> {
        self.change_link(LinkChange::Link, product_id, category_id).await
    }

    /// Take a product out of a category.
    #[instrument(skip(self), fields(product_id = %product_id, category_id = %category_id), err)]
    pub async fn unlink(
        &self,
        product_id: ProductId,
        category_id: CategoryId,
    ) -> Result<(), OperationError> {
        self.change_link(LinkChange::Unlink, product_id, category_id).await
    }

    async fn change_link(
        &self,
        change: LinkChange,
        product_id: ProductId,
        category_id: CategoryId,
    ) -> Result<(), OperationError> {
        let mut tx = self.store.begin(IsolationLevel::RepeatableRead).await?;
        let outcome = change_link_in(&mut tx, change, product_id, category_id).await;
        settle(tx, outcome).await.inspect_err(|err| {
            if let OperationError::Rejected(rejections) = err {
                warn!(?change, %rejections, "link change rejected");
            }
        })?;

        info!(?change, "link change committed");
        Ok(())
    }
}

async fn change_link_in<Tx: LedgerTx>(
    tx: &mut Tx,
    change: LinkChange,
    product_id: ProductId,
    category_id: CategoryId,
) -> Result<(), OperationError> {
    // Read one after another: the transaction owns a single connection.
    let product = tx.product(product_id).await?;
    let category = tx.category(category_id).await?;
    let existing = tx.link(product_id, category_id).await?;

    let link = ProductCategoryLink::new(product_id, category_id);
    match change {
        LinkChange::Link => {
            check_link(product.as_ref(), category.as_ref(), existing.as_ref())?;
            tx.insert_link(link).await?;
        }
        LinkChange::Unlink => {
            check_unlink(product.as_ref(), category.as_ref(), existing.as_ref())?;
            tx.delete_link(link).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::Rejection;
    use stockroom_products::{Category, Product};

    use crate::ledger::InMemoryLedgerStore;

    fn catalog() -> (InMemoryLedgerStore, ProductId, CategoryId) {
        let ledger = InMemoryLedgerStore::new();
        let product = Product::new(ProductId::new(), "Kettle");
        let category = Category::new(CategoryId::new(), "Kitchen");
        let ids = (product.id, category.id);
        ledger.seed_product(product).unwrap();
        ledger.seed_category(category).unwrap();
        (ledger, ids.0, ids.1)
    }

    fn rejections(err: OperationError) -> Vec<Rejection> {
        match err {
            OperationError::Rejected(r) => r.into_vec(),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    async fn committed_links(ledger: &InMemoryLedgerStore) -> Vec<ProductCategoryLink> {
        let mut tx = ledger.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.links().await.unwrap()
    }

    #[tokio::test]
    async fn link_then_unlink() {
        let (ledger, product_id, category_id) = catalog();
        let ops = StockOperations::new(ledger.clone());

        ops.link(product_id, category_id).await.unwrap();
        assert_eq!(
            committed_links(&ledger).await,
            vec![ProductCategoryLink::new(product_id, category_id)]
        );

        ops.unlink(product_id, category_id).await.unwrap();
        assert!(committed_links(&ledger).await.is_empty());
    }

    #[tokio::test]
    async fn double_link_is_rejected() {
        let (ledger, product_id, category_id) = catalog();
        let ops = StockOperations::new(ledger.clone());

        ops.link(product_id, category_id).await.unwrap();
        let err = ops.link(product_id, category_id).await.unwrap_err();
        assert_eq!(rejections(err), vec![Rejection::AlreadyLinked]);
        assert_eq!(committed_links(&ledger).await.len(), 1);
    }

    #[tokio::test]
    async fn unlink_of_unlinked_pair_is_rejected() {
        let (ledger, product_id, category_id) = catalog();
        let ops = StockOperations::new(ledger);

        let err = ops.unlink(product_id, category_id).await.unwrap_err();
        assert_eq!(rejections(err), vec![Rejection::NotLinked]);
    }

    #[tokio::test]
    async fn unknown_ids_are_all_reported() {
        let (ledger, _, _) = catalog();
        let ops = StockOperations::new(ledger.clone());

        let err = ops.link(ProductId::new(), CategoryId::new()).await.unwrap_err();
        assert_eq!(
            rejections(err),
            vec![Rejection::ProductNotFound, Rejection::CategoryNotFound]
        );

        let err = ops.unlink(ProductId::new(), CategoryId::new()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "product does not exist; category does not exist; product is not in the category"
        );
        assert!(committed_links(&ledger).await.is_empty());
    }

    #[tokio::test]
    async fn racing_links_of_one_pair_leave_a_single_row() {
        let (ledger, product_id, category_id) = catalog();

        let mut first = ledger.begin(IsolationLevel::RepeatableRead).await.unwrap();
        let mut second = ledger.begin(IsolationLevel::RepeatableRead).await.unwrap();
        change_link_in(&mut first, LinkChange::Link, product_id, category_id)
            .await
            .unwrap();
        change_link_in(&mut second, LinkChange::Link, product_id, category_id)
            .await
            .unwrap();

        settle(first, Ok(())).await.unwrap();
        let err = settle(second, Ok(())).await.unwrap_err();
        assert!(matches!(err, OperationError::Conflict(_)));
        assert_eq!(committed_links(&ledger).await.len(), 1);
    }
}
